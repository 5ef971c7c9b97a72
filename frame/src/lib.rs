pub mod common;
pub mod data;
pub mod exception;
mod frame;
mod pdu;

pub const MAX_PDU_SIZE: usize = 253; // Max. size of a protocol data unit
pub const MAX_RTU_FRAME_SIZE: usize = 256; // unit id + PDU + CRC
pub const MAX_MBAP_FRAME_SIZE: usize = 260; // MBAP header + unit id + PDU
pub const MBAP_HEADER_LEN: usize = 7;

pub const MAX_RD_REGS: usize = 125; // Max. registers in a read request
pub const MAX_WR_REGS: usize = 123; // Max. registers in a write request
pub const MAX_RD_COILS: usize = 2000; // Max. coils in a read request
pub const MAX_WR_COILS: usize = 1968; // Max. coils in a write request

pub const MAX_DATA_SIZE: usize = 256; // payload storage capacity

pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

pub use crate::frame::RequestFrame;
pub use crate::frame::ResponseFrame;
pub use crate::pdu::RequestPdu;
pub use crate::pdu::ResponsePdu;

pub mod prelude {
    pub use crate::data::{Coils, Data, Registers};
    pub use crate::exception::Code;
    pub use crate::{RequestFrame, RequestPdu, ResponseFrame, ResponsePdu};
}
