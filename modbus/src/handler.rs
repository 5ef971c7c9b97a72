use crate::error::Error;
use std::net::SocketAddr;

/// Request passed to the coils handler (read coils 0x01, write single coil
/// 0x05, write multiple coils 0x0F).
#[derive(Debug)]
pub struct CoilsRequest {
    pub client_addr: SocketAddr,
    /// role carried by the client certificate on MBAPS links, "" otherwise
    pub client_role: String,
    pub unit_id: u8,
    /// base coil address; the request covers addr..addr + quantity - 1
    pub addr: u16,
    pub quantity: u16,
    pub is_write: bool,
    /// coil values to set, ordered from `addr` (writes only)
    pub args: Vec<bool>,
}

/// Request passed to the discrete inputs handler (0x02).
#[derive(Debug)]
pub struct DiscreteInputsRequest {
    pub client_addr: SocketAddr,
    pub client_role: String,
    pub unit_id: u8,
    pub addr: u16,
    pub quantity: u16,
}

/// Request passed to the holding registers handler (read 0x03, write single
/// 0x06, write multiple 0x10).
#[derive(Debug)]
pub struct HoldingRegistersRequest {
    pub client_addr: SocketAddr,
    pub client_role: String,
    pub unit_id: u8,
    pub addr: u16,
    pub quantity: u16,
    pub is_write: bool,
    /// register values to set, ordered from `addr` (writes only)
    pub args: Vec<u16>,
}

/// Request passed to the input registers handler (0x04).
#[derive(Debug)]
pub struct InputRegistersRequest {
    pub client_addr: SocketAddr,
    pub client_role: String,
    pub unit_id: u8,
    pub addr: u16,
    pub quantity: u16,
}

/// Register backend of the server, supplied at construction and shared by
/// every session.
///
/// Read handlers must return exactly `quantity` items; anything else turns
/// into a server device failure exception. Returning a modbus error (e.g.
/// `Error::IllegalDataAddress`) selects the exception code of the negative
/// response; any other error maps to `ServerDeviceFailure`.
pub trait RequestHandler: Send + Sync {
    fn handle_coils(&self, req: &CoilsRequest) -> Result<Vec<bool>, Error>;

    fn handle_discrete_inputs(&self, req: &DiscreteInputsRequest) -> Result<Vec<bool>, Error>;

    fn handle_holding_registers(&self, req: &HoldingRegistersRequest) -> Result<Vec<u16>, Error>;

    fn handle_input_registers(&self, req: &InputRegistersRequest) -> Result<Vec<u16>, Error>;
}

/// Placeholder handler: every request is answered with an illegal function
/// exception.
pub struct DummyHandler;

impl RequestHandler for DummyHandler {
    fn handle_coils(&self, _req: &CoilsRequest) -> Result<Vec<bool>, Error> {
        Err(Error::IllegalFunction)
    }

    fn handle_discrete_inputs(&self, _req: &DiscreteInputsRequest) -> Result<Vec<bool>, Error> {
        Err(Error::IllegalFunction)
    }

    fn handle_holding_registers(&self, _req: &HoldingRegistersRequest) -> Result<Vec<u16>, Error> {
        Err(Error::IllegalFunction)
    }

    fn handle_input_registers(&self, _req: &InputRegistersRequest) -> Result<Vec<u16>, Error> {
        Err(Error::IllegalFunction)
    }
}
