use crate::config::{parse_url, Scheme, ServerConfig};
use crate::error::Error;
use crate::handler::{
    CoilsRequest, DiscreteInputsRequest, HoldingRegistersRequest, InputRegistersRequest,
    RequestHandler,
};
use crate::transport::link::{Link, TcpLink};
use crate::transport::{tls, Transport};
use codec::encoding::{self, Endianness};
use frame::exception::Code;
use frame::{common, RequestFrame, RequestPdu, ResponseFrame, ResponsePdu, COIL_OFF, COIL_ON};
use log::{error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Duration;
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Sessions = Arc<Mutex<HashMap<Uuid, AbortHandle>>>;

/// Modbus server: accepts TCP or TLS connections and serves each one from
/// its own task, dispatching decoded requests to the shared handler.
pub struct Server {
    target: String,
    timeout: Duration,
    max_clients: u32,
    handler: Arc<dyn RequestHandler>,
    tls: Option<TlsAcceptor>,
    sessions: Sessions,
    accept_task: Option<JoinHandle<()>>,
    bound: Option<SocketAddr>,
}

impl Server {
    /// Validates the configuration and prepares a stopped server.
    pub fn new(conf: ServerConfig, handler: Arc<dyn RequestHandler>) -> Result<Server, Error> {
        let (scheme, target) = parse_url(&conf.url)?;

        let tls = match scheme {
            Scheme::Tcp => None,
            Scheme::TcpTls => {
                let Some(identity) = conf.tls_server_cert else {
                    error!("modbus-server({}): missing server certificate", target);
                    return Err(Error::Configuration);
                };
                let Some(client_cas) = conf.tls_client_cas else {
                    error!("modbus-server({}): missing client CA certificates", target);
                    return Err(Error::Configuration);
                };
                let config = tls::server_config(identity, client_cas)?;
                Some(TlsAcceptor::from(Arc::new(config)))
            }
            _ => {
                error!("modbus-server({}): only tcp and tcp+tls are supported", target);
                return Err(Error::Configuration);
            }
        };

        Ok(Server {
            target,
            timeout: conf.timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            max_clients: conf.max_clients,
            handler,
            tls,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            accept_task: None,
            bound: None,
        })
    }

    /// Binds the listener and starts accepting clients. Non-blocking.
    pub async fn start(&mut self) -> Result<(), Error> {
        if self.accept_task.is_some() {
            return Err(Error::TransportIsAlreadyOpen);
        }

        let listener = TcpListener::bind(&self.target).await?;
        self.bound = listener.local_addr().ok();
        info!("modbus-server({}) listening", self.target);

        let loop_ = AcceptLoop {
            listener,
            timeout: self.timeout,
            max_clients: self.max_clients,
            handler: self.handler.clone(),
            tls: self.tls.clone(),
            sessions: self.sessions.clone(),
        };
        self.accept_task = Some(tokio::spawn(loop_.run()));
        Ok(())
    }

    /// Stops accepting new clients and closes every active session.
    pub async fn stop(&mut self) -> Result<(), Error> {
        let Some(task) = self.accept_task.take() else {
            return Err(Error::TransportIsAlreadyClosed);
        };
        task.abort();

        let handles: Vec<AbortHandle> = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.abort();
        }
        self.bound = None;
        Ok(())
    }

    /// Number of currently connected clients.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Address the listener is bound to, available once started (useful
    /// when binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound
    }
}

struct AcceptLoop {
    listener: TcpListener,
    timeout: Duration,
    max_clients: u32,
    handler: Arc<dyn RequestHandler>,
    tls: Option<TlsAcceptor>,
    sessions: Sessions,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("failed to accept client connection: {}", err);
                    continue;
                }
            };

            let accepted = {
                let sessions = self.sessions.lock().unwrap();
                self.max_clients == 0 || sessions.len() < self.max_clients as usize
            };
            if !accepted {
                warn!(
                    "max. number of concurrent connections reached, rejecting {}",
                    peer
                );
                drop(stream);
                continue;
            }

            self.spawn_session(stream, peer);
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let id = Uuid::new_v4();
        let sessions = self.sessions.clone();
        let handler = self.handler.clone();
        let tls = self.tls.clone();
        let timeout = self.timeout;

        // the session waits for its registration so that it cannot finish
        // before its own entry exists
        let (registered_tx, registered_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = registered_rx.await;
            Session::run(stream, peer, handler, tls, timeout).await;
            sessions.lock().unwrap().remove(&id);
        });

        self.sessions
            .lock()
            .unwrap()
            .insert(id, task.abort_handle());
        let _ = registered_tx.send(());
    }
}

struct Session;

impl Session {
    async fn run(
        stream: TcpStream,
        peer: SocketAddr,
        handler: Arc<dyn RequestHandler>,
        tls: Option<TlsAcceptor>,
        timeout: Duration,
    ) {
        let (link, role): (Box<dyn Link>, String) = match tls {
            None => (Box::new(TcpLink::new(stream)), String::new()),
            Some(acceptor) => match tls::accept(stream, acceptor).await {
                Ok((link, role)) => (Box::new(link), role),
                Err(err) => {
                    warn!("tls handshake with {} failed: {}", peer, err);
                    return;
                }
            },
        };

        let mut transport = Transport::mbap(link, &peer.to_string(), timeout);
        info!("{} connected", peer);

        loop {
            let req = match transport.read_request().await {
                Ok(req) => req,
                Err(_) => break,
            };

            let function = req.pdu.func();
            let unit_id = req.slave;

            let pdu = match handle_request(&req, peer, &role, handler.as_ref()) {
                Ok(pdu) => pdu,
                Err(Error::ProtocolError) => {
                    warn!("protocol error, closing link (client address: '{}')", peer);
                    let _ = transport.close().await;
                    return;
                }
                Err(err) => ResponsePdu::exception(function, err.to_exception()),
            };

            if let Err(err) = transport
                .write_response(ResponseFrame::new(unit_id, pdu))
                .await
            {
                warn!("failed to write response: {}", err);
            }
        }

        let _ = transport.close().await;
        info!("{} closed", peer);
    }
}

/// Per-function decode and dispatch. Responses mirror the request fields the
/// way the protocol prescribes; `Err(ProtocolError)` tells the session to
/// drop the link.
fn handle_request(
    req: &RequestFrame,
    peer: SocketAddr,
    role: &str,
    handler: &dyn RequestHandler,
) -> Result<ResponsePdu, Error> {
    let RequestPdu::Raw { function, data } = &req.pdu else {
        return Err(Error::ProtocolError);
    };
    let unit_id = req.slave;
    let payload = data.get();

    match *function {
        0x01 | 0x02 => {
            let (addr, quantity) = read_header(payload)?;
            if quantity == 0 || quantity as usize > frame::MAX_RD_COILS {
                return Err(Error::ProtocolError);
            }
            if !common::address_check(addr, quantity) {
                return Err(Error::IllegalDataAddress);
            }

            let coils = if *function == 0x01 {
                handler.handle_coils(&CoilsRequest {
                    client_addr: peer,
                    client_role: role.to_owned(),
                    unit_id,
                    addr,
                    quantity,
                    is_write: false,
                    args: Vec::new(),
                })?
            } else {
                handler.handle_discrete_inputs(&DiscreteInputsRequest {
                    client_addr: peer,
                    client_role: role.to_owned(),
                    unit_id,
                    addr,
                    quantity,
                })?
            };

            if coils.len() != quantity as usize {
                error!(
                    "handler returned {} bools, expected {}",
                    coils.len(),
                    quantity
                );
                return Err(Error::ServerDeviceFailure);
            }

            Ok(if *function == 0x01 {
                ResponsePdu::read_coils(coils.as_slice())
            } else {
                ResponsePdu::read_discrete_inputs(coils.as_slice())
            })
        }

        0x03 | 0x04 => {
            let (addr, quantity) = read_header(payload)?;
            if quantity == 0 || quantity as usize > frame::MAX_RD_REGS {
                return Err(Error::ProtocolError);
            }
            if !common::address_check(addr, quantity) {
                return Err(Error::IllegalDataAddress);
            }

            let regs = if *function == 0x03 {
                handler.handle_holding_registers(&HoldingRegistersRequest {
                    client_addr: peer,
                    client_role: role.to_owned(),
                    unit_id,
                    addr,
                    quantity,
                    is_write: false,
                    args: Vec::new(),
                })?
            } else {
                handler.handle_input_registers(&InputRegistersRequest {
                    client_addr: peer,
                    client_role: role.to_owned(),
                    unit_id,
                    addr,
                    quantity,
                })?
            };

            if regs.len() != quantity as usize {
                error!(
                    "handler returned {} 16-bit values, expected {}",
                    regs.len(),
                    quantity
                );
                return Err(Error::ServerDeviceFailure);
            }

            Ok(if *function == 0x03 {
                ResponsePdu::read_holding_registers(regs.as_slice())
            } else {
                ResponsePdu::read_input_registers(regs.as_slice())
            })
        }

        0x05 => {
            let (addr, value) = read_header(payload)?;
            if value != COIL_ON && value != COIL_OFF {
                return Err(Error::ProtocolError);
            }
            let value = value == COIL_ON;

            handler.handle_coils(&CoilsRequest {
                client_addr: peer,
                client_role: role.to_owned(),
                unit_id,
                addr,
                quantity: 1,
                is_write: true,
                args: vec![value],
            })?;

            Ok(ResponsePdu::write_single_coil(addr, value))
        }

        0x06 => {
            let (addr, value) = read_header(payload)?;

            handler.handle_holding_registers(&HoldingRegistersRequest {
                client_addr: peer,
                client_role: role.to_owned(),
                unit_id,
                addr,
                quantity: 1,
                is_write: true,
                args: vec![value],
            })?;

            Ok(ResponsePdu::write_single_register(addr, value))
        }

        0x0F => {
            let (addr, quantity) = write_header(payload)?;
            if quantity == 0 || quantity as usize > frame::MAX_WR_COILS {
                return Err(Error::ProtocolError);
            }
            if !common::address_check(addr, quantity) {
                return Err(Error::IllegalDataAddress);
            }

            let expected = common::ncoils_len(quantity);
            if payload[4] as usize != expected || payload.len() - 5 != expected {
                return Err(Error::ProtocolError);
            }

            handler.handle_coils(&CoilsRequest {
                client_addr: peer,
                client_role: role.to_owned(),
                unit_id,
                addr,
                quantity,
                is_write: true,
                args: encoding::decode_bools(quantity, &payload[5..]),
            })?;

            Ok(ResponsePdu::write_multiple_coils(addr, quantity))
        }

        0x10 => {
            let (addr, quantity) = write_header(payload)?;
            if quantity == 0 || quantity as usize > frame::MAX_WR_REGS {
                return Err(Error::ProtocolError);
            }
            if !common::address_check(addr, quantity) {
                return Err(Error::IllegalDataAddress);
            }

            let expected = common::nregs_len(quantity);
            if payload[4] as usize != expected || payload.len() - 5 != expected {
                return Err(Error::ProtocolError);
            }

            handler.handle_holding_registers(&HoldingRegistersRequest {
                client_addr: peer,
                client_role: role.to_owned(),
                unit_id,
                addr,
                quantity,
                is_write: true,
                args: encoding::u16s_from_bytes(Endianness::Big, &payload[5..]),
            })?;

            Ok(ResponsePdu::write_multiple_registers(addr, quantity))
        }

        function => Ok(ResponsePdu::exception(function, Code::IllegalFunction)),
    }
}

/// Fixed 4-byte request body: address plus quantity or value. A body of any
/// other size is answered with an illegal data value exception.
fn read_header(payload: &[u8]) -> Result<(u16, u16), Error> {
    if payload.len() != 4 {
        return Err(Error::IllegalDataValue);
    }
    Ok((be16(payload, 0), be16(payload, 2)))
}

/// Multi-write request body: address, quantity, byte count and data.
fn write_header(payload: &[u8]) -> Result<(u16, u16), Error> {
    if payload.len() < 5 {
        return Err(Error::IllegalDataValue);
    }
    Ok((be16(payload, 0), be16(payload, 2)))
}

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

#[cfg(test)]
mod test {
    use super::*;
    use frame::data::Data;
    use std::sync::Mutex as StdMutex;

    /// 16 coils and 16 holding registers backed by plain arrays, enough to
    /// exercise the dispatcher.
    struct BankHandler {
        coils: StdMutex<[bool; 16]>,
        holding: StdMutex<[u16; 16]>,
    }

    impl BankHandler {
        fn new() -> BankHandler {
            BankHandler {
                coils: StdMutex::new([false; 16]),
                holding: StdMutex::new([0; 16]),
            }
        }
    }

    impl RequestHandler for BankHandler {
        fn handle_coils(&self, req: &CoilsRequest) -> Result<Vec<bool>, Error> {
            let mut coils = self.coils.lock().unwrap();
            let start = req.addr as usize;
            let end = start + req.quantity as usize;
            if end > coils.len() {
                return Err(Error::IllegalDataAddress);
            }
            if req.is_write {
                coils[start..end].copy_from_slice(&req.args);
            }
            Ok(coils[start..end].to_vec())
        }

        fn handle_discrete_inputs(&self, req: &DiscreteInputsRequest) -> Result<Vec<bool>, Error> {
            Ok(vec![false; req.quantity as usize])
        }

        fn handle_holding_registers(
            &self,
            req: &HoldingRegistersRequest,
        ) -> Result<Vec<u16>, Error> {
            let mut holding = self.holding.lock().unwrap();
            let start = req.addr as usize;
            let end = start + req.quantity as usize;
            if end > holding.len() {
                return Err(Error::IllegalDataAddress);
            }
            if req.is_write {
                holding[start..end].copy_from_slice(&req.args);
            }
            Ok(holding[start..end].to_vec())
        }

        fn handle_input_registers(&self, req: &InputRegistersRequest) -> Result<Vec<u16>, Error> {
            Ok(vec![0x0102; req.quantity as usize])
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn raw_request(unit: u8, function: u8, payload: &[u8]) -> RequestFrame {
        RequestFrame::new(unit, RequestPdu::raw(function, Data::raw(payload)))
    }

    #[test]
    fn write_then_read_coils() {
        let handler = BankHandler::new();

        // write 4 coils (1, 0, 1, 1) at address 5
        let req = raw_request(1, 0x0F, &[0x00, 0x05, 0x00, 0x04, 0x01, 0x0D]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        assert_eq!(
            res,
            ResponsePdu::WriteMultipleCoils {
                address: 5,
                nobjs: 4
            }
        );

        // read them back
        let req = raw_request(1, 0x01, &[0x00, 0x05, 0x00, 0x04]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        match res {
            ResponsePdu::ReadCoils { data } => {
                assert_eq!(data.get(), &[0x0D]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn write_then_read_registers() {
        let handler = BankHandler::new();

        let req = raw_request(
            1,
            0x10,
            &[0x00, 0x01, 0x00, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78],
        );
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        assert_eq!(
            res,
            ResponsePdu::WriteMultipleRegisters {
                address: 1,
                nobjs: 2
            }
        );

        let req = raw_request(1, 0x03, &[0x00, 0x01, 0x00, 0x02]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        match res {
            ResponsePdu::ReadHoldingRegisters { data } => {
                assert_eq!(data.get_u16(0).unwrap(), 0x1234);
                assert_eq!(data.get_u16(1).unwrap(), 0x5678);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn single_writes() {
        let handler = BankHandler::new();

        let req = raw_request(1, 0x05, &[0x00, 0x03, 0xFF, 0x00]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        assert_eq!(
            res,
            ResponsePdu::WriteSingleCoil {
                address: 3,
                value: true
            }
        );
        assert!(handler.coils.lock().unwrap()[3]);

        let req = raw_request(1, 0x06, &[0x00, 0x02, 0x06, 0x05]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        assert_eq!(
            res,
            ResponsePdu::WriteSingleRegister {
                address: 2,
                value: 0x0605
            }
        );
        assert_eq!(handler.holding.lock().unwrap()[2], 0x0605);
    }

    #[test]
    fn bad_coil_value_closes_the_link() {
        let handler = BankHandler::new();
        let req = raw_request(1, 0x05, &[0x00, 0x03, 0x12, 0x34]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );
    }

    #[test]
    fn bad_quantity_closes_the_link() {
        let handler = BankHandler::new();

        let req = raw_request(1, 0x01, &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );

        let req = raw_request(1, 0x01, &[0x00, 0x00, 0x07, 0xD1]); // 2001
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );

        let req = raw_request(1, 0x03, &[0x00, 0x00, 0x00, 0x7E]); // 126
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );
    }

    #[test]
    fn mismatched_byte_count_closes_the_link() {
        let handler = BankHandler::new();

        // byte count says 2, quantity needs 1
        let req = raw_request(1, 0x0F, &[0x00, 0x05, 0x00, 0x04, 0x02, 0x0D, 0x00]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );

        // announced byte count does not match the trailing data
        let req = raw_request(1, 0x10, &[0x00, 0x01, 0x00, 0x02, 0x04, 0x12, 0x34]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::ProtocolError
        );
    }

    #[test]
    fn wrong_length_yields_illegal_data_value() {
        let handler = BankHandler::new();
        let req = raw_request(1, 0x03, &[0x00, 0x01, 0x00]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::IllegalDataValue
        );
    }

    #[test]
    fn address_wraparound_yields_illegal_data_address() {
        let handler = BankHandler::new();
        let req = raw_request(1, 0x01, &[0xFF, 0xFE, 0x00, 0x03]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::IllegalDataAddress
        );
    }

    #[test]
    fn unknown_function_answers_illegal_function() {
        let handler = BankHandler::new();
        let req = raw_request(1, 0x2B, &[0x0E, 0x01]);
        let res = handle_request(&req, peer(), "", &handler).unwrap();
        assert_eq!(
            res,
            ResponsePdu::Exception {
                function: 0xAB,
                code: Code::IllegalFunction
            }
        );
    }

    #[test]
    fn handler_count_mismatch_is_a_device_failure() {
        struct ShortHandler;
        impl RequestHandler for ShortHandler {
            fn handle_coils(&self, _req: &CoilsRequest) -> Result<Vec<bool>, Error> {
                Ok(vec![true]) // always one coil, whatever was asked
            }
            fn handle_discrete_inputs(
                &self,
                _req: &DiscreteInputsRequest,
            ) -> Result<Vec<bool>, Error> {
                Ok(Vec::new())
            }
            fn handle_holding_registers(
                &self,
                _req: &HoldingRegistersRequest,
            ) -> Result<Vec<u16>, Error> {
                Ok(Vec::new())
            }
            fn handle_input_registers(
                &self,
                _req: &InputRegistersRequest,
            ) -> Result<Vec<u16>, Error> {
                Ok(Vec::new())
            }
        }

        let req = raw_request(1, 0x01, &[0x00, 0x00, 0x00, 0x04]);
        assert_eq!(
            handle_request(&req, peer(), "", &ShortHandler).err().unwrap(),
            Error::ServerDeviceFailure
        );
    }

    #[test]
    fn handler_errors_select_the_exception() {
        let handler = BankHandler::new();
        // the bank only has 16 coils
        let req = raw_request(1, 0x01, &[0x00, 0x20, 0x00, 0x04]);
        assert_eq!(
            handle_request(&req, peer(), "", &handler).err().unwrap(),
            Error::IllegalDataAddress
        );
    }
}
