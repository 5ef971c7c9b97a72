pub mod crc;
pub mod encoding;
pub mod error;
pub mod helpers;
pub mod mbap;
pub mod pdu;
pub mod rtu;

pub use error::Error;
