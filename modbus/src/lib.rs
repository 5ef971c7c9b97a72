pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod transport;

pub use client::{Client, RegisterType};
pub use config::{CertPool, ClientConfig, ServerConfig, TlsIdentity};
pub use error::Error;
pub use handler::{
    CoilsRequest, DiscreteInputsRequest, DummyHandler, HoldingRegistersRequest,
    InputRegistersRequest, RequestHandler,
};
pub use server::Server;

pub use codec::encoding::{Endianness, WordOrder};
pub use frame::exception::Code as ExceptionCode;

pub mod prelude {
    pub use crate::client::{Client, RegisterType};
    pub use crate::config::{CertPool, ClientConfig, ServerConfig, TlsIdentity};
    pub use crate::error::Error;
    pub use crate::handler::{
        CoilsRequest, DiscreteInputsRequest, DummyHandler, HoldingRegistersRequest,
        InputRegistersRequest, RequestHandler,
    };
    pub use crate::server::Server;
    pub use codec::encoding::{Endianness, WordOrder};
}
