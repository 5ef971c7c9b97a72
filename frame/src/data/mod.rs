pub mod coils;
pub mod registers;
pub mod storage;

pub use coils::Coils;
pub use registers::{Registers, RegistersSlice};
pub use storage::Data;
