use crate::config::{parse_url, ClientConfig, Scheme};
use crate::error::Error;
use crate::transport::link::TcpLink;
use crate::transport::serial::{SerialLink, SerialSettings};
use crate::transport::udp::UdpLink;
use crate::transport::{tls, Transport};
use codec::encoding::{self, Endianness, WordOrder};
use frame::data::RegistersSlice;
use frame::{common, RequestFrame, RequestPdu, ResponseFrame, ResponsePdu};
use log::{error, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SERIAL_SPEED: u32 = 19200;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RegisterType {
    /// writable 16-bit register (function codes 0x03, 0x06, 0x10)
    Holding,
    /// read-only 16-bit register (function code 0x04)
    Input,
}

/// Modbus client over any of the supported transports.
///
/// All operations take `&mut self`, so a single instance cannot issue
/// overlapping requests; callers that share one client across tasks wrap it
/// in a `tokio::sync::Mutex`.
pub struct Client {
    scheme: Scheme,
    target: String,
    name: String,
    speed: u32,
    timeout: Duration,
    serial: Option<SerialSettings>,
    tls: Option<Arc<tokio_rustls::rustls::ClientConfig>>,
    transport: Option<Transport>,
    unit_id: u8,
    endianness: Endianness,
    word_order: WordOrder,
}

impl Client {
    /// Validates the configuration and prepares a closed client. `open`
    /// establishes the connection.
    pub fn new(conf: ClientConfig) -> Result<Client, Error> {
        let (scheme, target) = parse_url(&conf.url)?;

        let speed = if conf.speed == 0 {
            DEFAULT_SERIAL_SPEED
        } else {
            conf.speed
        };

        let timeout = conf.timeout.unwrap_or(match scheme {
            Scheme::Rtu => Duration::from_millis(300),
            _ => Duration::from_secs(1),
        });

        let serial = match scheme {
            Scheme::Rtu => Some(SerialSettings {
                device: target.clone(),
                speed,
                data_bits: conf.effective_data_bits(),
                parity: conf.parity,
                stop_bits: conf.effective_stop_bits(),
            }),
            _ => None,
        };

        let tls = if scheme == Scheme::TcpTls {
            // the protocol has no inherent auth facility; mutual TLS is
            // mandatory on MBAPS links
            let Some(identity) = conf.tls_client_cert else {
                error!("modbus-client({}): missing client certificate", target);
                return Err(Error::Configuration);
            };
            let Some(roots) = conf.tls_root_cas else {
                error!("modbus-client({}): missing CA/server certificate", target);
                return Err(Error::Configuration);
            };
            Some(Arc::new(tls::client_config(identity, roots)?))
        } else {
            None
        };

        Ok(Client {
            scheme,
            name: format!("modbus-client({})", target),
            target,
            speed,
            timeout,
            serial,
            tls,
            transport: None,
            unit_id: 1,
            endianness: Endianness::Big,
            word_order: WordOrder::HighFirst,
        })
    }

    /// Opens the underlying transport (network socket or serial line).
    pub async fn open(&mut self) -> Result<(), Error> {
        if self.transport.is_some() {
            return Err(Error::TransportIsAlreadyOpen);
        }

        let transport = match self.scheme {
            Scheme::Rtu => {
                let link = SerialLink::open(self.serial.as_ref().unwrap())?;
                Transport::rtu(Box::new(link), &self.target, self.speed, self.timeout)
            }
            Scheme::RtuOverTcp => {
                let link = TcpLink::new(self.connect_tcp().await?);
                Transport::rtu(Box::new(link), &self.target, self.speed, self.timeout)
            }
            Scheme::RtuOverUdp => {
                let link = UdpLink::connect(&self.target).await?;
                Transport::rtu(Box::new(link), &self.target, self.speed, self.timeout)
            }
            Scheme::Tcp => {
                let link = TcpLink::new(self.connect_tcp().await?);
                Transport::mbap(Box::new(link), &self.target, self.timeout)
            }
            Scheme::TcpTls => {
                let config = self.tls.as_ref().unwrap().clone();
                let link = tls::connect(&self.target, config).await?;
                Transport::mbap(Box::new(link), &self.target, self.timeout)
            }
            Scheme::Udp => {
                let link = UdpLink::connect(&self.target).await?;
                Transport::mbap(Box::new(link), &self.target, self.timeout)
            }
        };

        self.transport = Some(transport);
        Ok(())
    }

    /// Closes the underlying transport.
    pub async fn close(&mut self) -> Result<(), Error> {
        match self.transport.as_mut() {
            Some(transport) => {
                let result = transport.close().await;
                self.transport = None;
                result
            }
            None => Err(Error::TransportIsAlreadyClosed),
        }
    }

    /// Sets the unit id (a.k.a. slave id) of subsequent requests.
    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    /// Sets the register encoding of subsequent requests. Affects register
    /// values only; addresses, quantities and framing stay big-endian.
    pub fn set_encoding(&mut self, endianness: Endianness, word_order: WordOrder) {
        self.endianness = endianness;
        self.word_order = word_order;
    }

    // --- coils and discrete inputs ---

    /// Reads multiple coils (function code 0x01).
    pub async fn read_coils(&mut self, addr: u16, quantity: u16) -> Result<Vec<bool>, Error> {
        self.read_bools(addr, quantity, false).await
    }

    /// Reads a single coil (function code 0x01).
    pub async fn read_coil(&mut self, addr: u16) -> Result<bool, Error> {
        Ok(self.read_bools(addr, 1, false).await?[0])
    }

    /// Reads multiple discrete inputs (function code 0x02).
    pub async fn read_discrete_inputs(
        &mut self,
        addr: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, Error> {
        self.read_bools(addr, quantity, true).await
    }

    /// Reads a single discrete input (function code 0x02).
    pub async fn read_discrete_input(&mut self, addr: u16) -> Result<bool, Error> {
        Ok(self.read_bools(addr, 1, true).await?[0])
    }

    /// Writes a single coil (function code 0x05).
    pub async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), Error> {
        let res = self
            .execute(RequestPdu::write_single_coil(addr, value))
            .await?;
        match res.pdu {
            ResponsePdu::WriteSingleCoil {
                address,
                value: echo,
            } => {
                if address != addr || echo != value {
                    warn!("{} unexpected echo in write coil response", self.name);
                    return Err(Error::ProtocolError);
                }
                Ok(())
            }
            pdu => self.fail(pdu, 0x05),
        }
    }

    /// Writes multiple coils (function code 0x0F).
    pub async fn write_coils(&mut self, addr: u16, values: &[bool]) -> Result<(), Error> {
        if values.is_empty() || values.len() > frame::MAX_WR_COILS {
            error!("{} quantity of coils is out of bounds", self.name);
            return Err(Error::UnexpectedParameters);
        }
        let quantity = values.len() as u16;
        self.check_address(addr, quantity)?;

        let res = self
            .execute(RequestPdu::write_multiple_coils(addr, values))
            .await?;
        match res.pdu {
            ResponsePdu::WriteMultipleCoils { address, nobjs } => {
                if address != addr || nobjs != quantity {
                    warn!("{} unexpected echo in write coils response", self.name);
                    return Err(Error::ProtocolError);
                }
                Ok(())
            }
            pdu => self.fail(pdu, 0x0F),
        }
    }

    // --- 16-bit registers ---

    /// Reads multiple 16-bit registers (function code 0x03 or 0x04).
    pub async fn read_registers(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u16>, Error> {
        let bytes = self.read_register_bytes(addr, quantity, reg_type).await?;
        Ok(encoding::u16s_from_bytes(self.endianness, &bytes))
    }

    /// Reads a single 16-bit register (function code 0x03 or 0x04).
    pub async fn read_register(
        &mut self,
        addr: u16,
        reg_type: RegisterType,
    ) -> Result<u16, Error> {
        Ok(self.read_registers(addr, 1, reg_type).await?[0])
    }

    /// Writes a single 16-bit register (function code 0x06).
    pub async fn write_register(&mut self, addr: u16, value: u16) -> Result<(), Error> {
        // the register value observes the configured endianness even in a
        // single-register write; everything around it stays big-endian
        let wire_value = match self.endianness {
            Endianness::Big => value,
            Endianness::Little => value.swap_bytes(),
        };

        let res = self
            .execute(RequestPdu::write_single_register(addr, wire_value))
            .await?;
        match res.pdu {
            ResponsePdu::WriteSingleRegister { address, value: echo } => {
                if address != addr || echo != wire_value {
                    warn!("{} unexpected echo in write register response", self.name);
                    return Err(Error::ProtocolError);
                }
                Ok(())
            }
            pdu => self.fail(pdu, 0x06),
        }
    }

    /// Writes multiple 16-bit registers (function code 0x10).
    pub async fn write_registers(&mut self, addr: u16, values: &[u16]) -> Result<(), Error> {
        let bytes = encoding::u16s_to_bytes(self.endianness, values);
        self.write_register_bytes(addr, &bytes).await
    }

    // --- multi-register values ---

    /// Reads multiple 32-bit values, two registers each.
    pub async fn read_u32s(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u32>, Error> {
        let nregs = self.widen_quantity(quantity, 2)?;
        let bytes = self.read_register_bytes(addr, nregs, reg_type).await?;
        Ok(encoding::u32s_from_bytes(
            self.endianness,
            self.word_order,
            &bytes,
        ))
    }

    pub async fn read_u32(&mut self, addr: u16, reg_type: RegisterType) -> Result<u32, Error> {
        Ok(self.read_u32s(addr, 1, reg_type).await?[0])
    }

    /// Reads multiple 32-bit floats, two registers each.
    pub async fn read_f32s(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<f32>, Error> {
        let nregs = self.widen_quantity(quantity, 2)?;
        let bytes = self.read_register_bytes(addr, nregs, reg_type).await?;
        Ok(encoding::f32s_from_bytes(
            self.endianness,
            self.word_order,
            &bytes,
        ))
    }

    pub async fn read_f32(&mut self, addr: u16, reg_type: RegisterType) -> Result<f32, Error> {
        Ok(self.read_f32s(addr, 1, reg_type).await?[0])
    }

    /// Reads multiple 64-bit values, four registers each.
    pub async fn read_u64s(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u64>, Error> {
        let nregs = self.widen_quantity(quantity, 4)?;
        let bytes = self.read_register_bytes(addr, nregs, reg_type).await?;
        Ok(encoding::u64s_from_bytes(
            self.endianness,
            self.word_order,
            &bytes,
        ))
    }

    pub async fn read_u64(&mut self, addr: u16, reg_type: RegisterType) -> Result<u64, Error> {
        Ok(self.read_u64s(addr, 1, reg_type).await?[0])
    }

    /// Reads multiple 64-bit floats, four registers each.
    pub async fn read_f64s(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<f64>, Error> {
        let nregs = self.widen_quantity(quantity, 4)?;
        let bytes = self.read_register_bytes(addr, nregs, reg_type).await?;
        Ok(encoding::f64s_from_bytes(
            self.endianness,
            self.word_order,
            &bytes,
        ))
    }

    pub async fn read_f64(&mut self, addr: u16, reg_type: RegisterType) -> Result<f64, Error> {
        Ok(self.read_f64s(addr, 1, reg_type).await?[0])
    }

    pub async fn write_u32s(&mut self, addr: u16, values: &[u32]) -> Result<(), Error> {
        let bytes = encoding::u32s_to_bytes(self.endianness, self.word_order, values);
        self.write_register_bytes(addr, &bytes).await
    }

    pub async fn write_u32(&mut self, addr: u16, value: u32) -> Result<(), Error> {
        self.write_u32s(addr, &[value]).await
    }

    pub async fn write_f32s(&mut self, addr: u16, values: &[f32]) -> Result<(), Error> {
        let bytes = encoding::f32s_to_bytes(self.endianness, self.word_order, values);
        self.write_register_bytes(addr, &bytes).await
    }

    pub async fn write_f32(&mut self, addr: u16, value: f32) -> Result<(), Error> {
        self.write_f32s(addr, &[value]).await
    }

    pub async fn write_u64s(&mut self, addr: u16, values: &[u64]) -> Result<(), Error> {
        let bytes = encoding::u64s_to_bytes(self.endianness, self.word_order, values);
        self.write_register_bytes(addr, &bytes).await
    }

    pub async fn write_u64(&mut self, addr: u16, value: u64) -> Result<(), Error> {
        self.write_u64s(addr, &[value]).await
    }

    pub async fn write_f64s(&mut self, addr: u16, values: &[f64]) -> Result<(), Error> {
        let bytes = encoding::f64s_to_bytes(self.endianness, self.word_order, values);
        self.write_register_bytes(addr, &bytes).await
    }

    pub async fn write_f64(&mut self, addr: u16, value: f64) -> Result<(), Error> {
        self.write_f64s(addr, &[value]).await
    }

    // --- register bytes ---

    /// Reads registers as bytes, swapping each register pair when the
    /// encoding is little-endian. Odd quantities drop the final pad byte.
    pub async fn read_bytes(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u8>, Error> {
        self.read_bytes_inner(addr, quantity, reg_type, true).await
    }

    /// Reads registers as bytes exactly as they come off the wire.
    pub async fn read_raw_bytes(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u8>, Error> {
        self.read_bytes_inner(addr, quantity, reg_type, false).await
    }

    /// Writes bytes into registers, swapping each register pair when the
    /// encoding is little-endian. Odd quantities get a zero pad byte.
    pub async fn write_bytes(&mut self, addr: u16, values: &[u8]) -> Result<(), Error> {
        self.write_bytes_inner(addr, values, true).await
    }

    /// Writes bytes into registers exactly as given (plus the odd-length
    /// pad byte).
    pub async fn write_raw_bytes(&mut self, addr: u16, values: &[u8]) -> Result<(), Error> {
        self.write_bytes_inner(addr, values, false).await
    }

    async fn read_bytes_inner(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
        observe_endianness: bool,
    ) -> Result<Vec<u8>, Error> {
        let nregs = quantity / 2 + quantity % 2;
        let mut bytes = self.read_register_bytes(addr, nregs, reg_type).await?;

        if observe_endianness && self.endianness == Endianness::Little {
            swap_register_bytes(&mut bytes);
        }

        if quantity % 2 == 1 {
            bytes.pop();
        }
        Ok(bytes)
    }

    async fn write_bytes_inner(
        &mut self,
        addr: u16,
        values: &[u8],
        observe_endianness: bool,
    ) -> Result<(), Error> {
        let mut bytes = values.to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(0x00);
        }

        if observe_endianness && self.endianness == Endianness::Little {
            swap_register_bytes(&mut bytes);
        }

        self.write_register_bytes(addr, &bytes).await
    }

    // --- internals ---

    /// Reads `quantity` registers and returns their wire bytes.
    async fn read_register_bytes(
        &mut self,
        addr: u16,
        quantity: u16,
        reg_type: RegisterType,
    ) -> Result<Vec<u8>, Error> {
        if quantity == 0 || quantity as usize > frame::MAX_RD_REGS {
            error!("{} quantity of registers is out of bounds", self.name);
            return Err(Error::UnexpectedParameters);
        }
        self.check_address(addr, quantity)?;

        let req = match reg_type {
            RegisterType::Holding => RequestPdu::read_holding_registers(addr, quantity),
            RegisterType::Input => RequestPdu::read_input_registers(addr, quantity),
        };
        let func = req.func();

        let res = self.execute(req).await?;
        let data = match (res.pdu, reg_type) {
            (ResponsePdu::ReadHoldingRegisters { data }, RegisterType::Holding) => data,
            (ResponsePdu::ReadInputRegisters { data }, RegisterType::Input) => data,
            (pdu, _) => return self.fail(pdu, func),
        };

        if data.len() != common::nregs_len(quantity) {
            warn!(
                "{} expected {} register bytes, received {}",
                self.name,
                common::nregs_len(quantity),
                data.len()
            );
            return Err(Error::ProtocolError);
        }
        Ok(data.get().to_vec())
    }

    /// Writes registers passed as wire bytes, two per register.
    async fn write_register_bytes(&mut self, addr: u16, bytes: &[u8]) -> Result<(), Error> {
        let quantity = (bytes.len() / 2) as u16;
        if quantity == 0 || quantity as usize > frame::MAX_WR_REGS {
            error!("{} quantity of registers is out of bounds", self.name);
            return Err(Error::UnexpectedParameters);
        }
        self.check_address(addr, quantity)?;

        let registers = RegistersSlice::new(bytes, quantity);
        let res = self
            .execute(RequestPdu::write_multiple_registers(addr, registers))
            .await?;
        match res.pdu {
            ResponsePdu::WriteMultipleRegisters { address, nobjs } => {
                if address != addr || nobjs != quantity {
                    warn!("{} unexpected echo in write registers response", self.name);
                    return Err(Error::ProtocolError);
                }
                Ok(())
            }
            pdu => self.fail(pdu, 0x10),
        }
    }

    /// Reads `quantity` bools, discrete inputs when `di` is set, coils
    /// otherwise.
    async fn read_bools(&mut self, addr: u16, quantity: u16, di: bool) -> Result<Vec<bool>, Error> {
        if quantity == 0 || quantity as usize > frame::MAX_RD_COILS {
            error!(
                "{} quantity of coils/discrete inputs is out of bounds",
                self.name
            );
            return Err(Error::UnexpectedParameters);
        }
        self.check_address(addr, quantity)?;

        let req = if di {
            RequestPdu::read_discrete_inputs(addr, quantity)
        } else {
            RequestPdu::read_coils(addr, quantity)
        };
        let func = req.func();

        let res = self.execute(req).await?;
        let data = match (res.pdu, di) {
            (ResponsePdu::ReadCoils { data }, false) => data,
            (ResponsePdu::ReadDiscreteInputs { data }, true) => data,
            (pdu, _) => return self.fail(pdu, func),
        };

        if data.len() != common::ncoils_len(quantity) {
            warn!(
                "{} expected {} coil bytes, received {}",
                self.name,
                common::ncoils_len(quantity),
                data.len()
            );
            return Err(Error::ProtocolError);
        }
        Ok(encoding::decode_bools(quantity, data.get()))
    }

    /// Runs the request across the transport and applies the unit id rules:
    /// a successful response must come from the addressed unit, an exception
    /// may also come from a gateway (unit id 0xFF).
    async fn execute(&mut self, pdu: RequestPdu) -> Result<ResponseFrame, Error> {
        let unit_id = self.unit_id;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::TransportIsAlreadyClosed);
        };

        let res = transport
            .execute_request(RequestFrame::new(unit_id, pdu))
            .await?;

        match res.pdu {
            ResponsePdu::Exception { .. } => {
                if res.slave != unit_id && res.slave != 0xFF {
                    return Err(Error::BadUnitId);
                }
            }
            _ => {
                if res.slave != unit_id {
                    return Err(Error::BadUnitId);
                }
            }
        }
        Ok(res)
    }

    /// Common tail for unexpected response PDUs: a matching exception maps
    /// to its typed error, anything else is a protocol error.
    fn fail<T>(&self, pdu: ResponsePdu, req_func: u8) -> Result<T, Error> {
        match pdu {
            ResponsePdu::Exception { function, code } if function == req_func | 0x80 => {
                Err(Error::from_exception(code))
            }
            pdu => {
                warn!(
                    "{} unexpected response code ({:#04x})",
                    self.name,
                    pdu.func()
                );
                Err(Error::ProtocolError)
            }
        }
    }

    fn check_address(&self, addr: u16, quantity: u16) -> Result<(), Error> {
        if !common::address_check(addr, quantity) {
            error!("{} end address is past 0xffff", self.name);
            return Err(Error::UnexpectedParameters);
        }
        Ok(())
    }

    /// Registers needed for `quantity` values spanning `span` registers
    /// each.
    fn widen_quantity(&self, quantity: u16, span: u16) -> Result<u16, Error> {
        quantity.checked_mul(span).ok_or_else(|| {
            error!("{} quantity of values is out of bounds", self.name);
            Error::UnexpectedParameters
        })
    }

    async fn connect_tcp(&self) -> Result<TcpStream, Error> {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(Error::RequestTimedOut),
        }
    }
}

fn swap_register_bytes(bytes: &mut [u8]) {
    for pair in bytes.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::link::mock::MockLink;
    use crate::transport::mbap::MbapTransport;

    fn closed_client() -> Client {
        Client::new(ClientConfig {
            url: "tcp://127.0.0.1:1502".to_owned(),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    fn client_with(link: MockLink) -> Client {
        let mut client = closed_client();
        client.transport = Some(Transport::Mbap(MbapTransport::new(
            Box::new(link),
            "mock",
            Duration::from_millis(100),
        )));
        client
    }

    #[test]
    fn rejects_malformed_urls() {
        for url in ["127.0.0.1:502", "ftp://127.0.0.1", ""] {
            let err = Client::new(ClientConfig {
                url: url.to_owned(),
                ..ClientConfig::default()
            })
            .err()
            .unwrap();
            assert_eq!(err, Error::Configuration);
        }
    }

    #[test]
    fn tls_requires_certificates() {
        let err = Client::new(ClientConfig {
            url: "tcp+tls://127.0.0.1:802".to_owned(),
            ..ClientConfig::default()
        })
        .err()
        .unwrap();
        assert_eq!(err, Error::Configuration);
    }

    #[tokio::test]
    async fn coil_quantity_bounds() {
        let mut client = closed_client();
        assert_eq!(
            client.read_coils(0, 0).await.err().unwrap(),
            Error::UnexpectedParameters
        );
        assert_eq!(
            client.read_coils(0, 2001).await.err().unwrap(),
            Error::UnexpectedParameters
        );
        assert_eq!(
            client.read_coils(0xFFFE, 3).await.err().unwrap(),
            Error::UnexpectedParameters
        );
        let too_many = vec![false; 1969];
        assert_eq!(
            client.write_coils(0, &too_many).await.err().unwrap(),
            Error::UnexpectedParameters
        );
    }

    #[tokio::test]
    async fn register_quantity_bounds() {
        let mut client = closed_client();
        assert_eq!(
            client
                .read_registers(0, 126, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::UnexpectedParameters
        );
        assert_eq!(
            client
                .read_registers(0, 0, RegisterType::Input)
                .await
                .err()
                .unwrap(),
            Error::UnexpectedParameters
        );
        let too_many = vec![0u16; 124];
        assert_eq!(
            client.write_registers(0, &too_many).await.err().unwrap(),
            Error::UnexpectedParameters
        );
        assert_eq!(
            client
                .read_registers(0xFFFF, 2, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::UnexpectedParameters
        );
    }

    #[tokio::test]
    async fn requests_require_an_open_transport() {
        let mut client = closed_client();
        assert_eq!(
            client.read_coils(0, 1).await.err().unwrap(),
            Error::TransportIsAlreadyClosed
        );
        assert_eq!(
            client.close().await.err().unwrap(),
            Error::TransportIsAlreadyClosed
        );
    }

    #[tokio::test]
    async fn read_registers_decodes_big_endian() {
        let mut link = MockLink::new();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ]);
        let mut client = client_with(link);

        let values = client
            .read_registers(0x1000, 2, RegisterType::Holding)
            .await
            .unwrap();
        assert_eq!(values, vec![0x1234, 0x5678]);
    }

    #[tokio::test]
    async fn read_registers_decodes_little_endian() {
        let mut link = MockLink::new();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ]);
        let mut client = client_with(link);
        client.set_encoding(Endianness::Little, WordOrder::HighFirst);

        let values = client
            .read_registers(0x1000, 2, RegisterType::Holding)
            .await
            .unwrap();
        assert_eq!(values, vec![0x3412, 0x7856]);
    }

    #[tokio::test]
    async fn exception_maps_to_typed_error() {
        let mut link = MockLink::new();
        link.feed(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]);
        let mut client = client_with(link);

        assert_eq!(
            client
                .read_registers(0x1000, 2, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::IllegalDataAddress
        );
    }

    #[tokio::test]
    async fn exception_accepts_gateway_unit_id() {
        let mut link = MockLink::new();
        link.feed(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0xFF, 0x83, 0x0B]);
        let mut client = client_with(link);

        assert_eq!(
            client
                .read_registers(0x1000, 2, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::GatewayTargetFailedToRespond
        );
    }

    #[tokio::test]
    async fn response_with_wrong_unit_id() {
        let mut link = MockLink::new();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x07, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ]);
        let mut client = client_with(link);

        assert_eq!(
            client
                .read_registers(0x1000, 2, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::BadUnitId
        );
    }

    #[tokio::test]
    async fn write_register_observes_endianness() {
        let mut link = MockLink::new();
        let tx = link.tx_handle();
        // echo of the little-endian value bytes
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x02, 0x05, 0x06,
        ]);
        let mut client = client_with(link);
        client.set_encoding(Endianness::Little, WordOrder::HighFirst);

        client.write_register(0x0002, 0x0605).await.unwrap();
        assert_eq!(
            tx.lock().unwrap().as_slice(),
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x02, 0x05, 0x06]
        );
    }

    #[tokio::test]
    async fn mismatched_echo_is_a_protocol_error() {
        let mut link = MockLink::new();
        // quantity echo of 3 instead of 4
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x0F, 0x00, 0x05, 0x00, 0x03,
        ]);
        let mut client = client_with(link);

        let values = [true, false, true, true];
        assert_eq!(
            client.write_coils(5, &values).await.err().unwrap(),
            Error::ProtocolError
        );
    }

    #[tokio::test]
    async fn mismatched_function_is_a_protocol_error() {
        let mut link = MockLink::new();
        // input register response to a holding register request
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x12, 0x34,
        ]);
        let mut client = client_with(link);

        assert_eq!(
            client
                .read_registers(0, 1, RegisterType::Holding)
                .await
                .err()
                .unwrap(),
            Error::ProtocolError
        );
    }

    #[tokio::test]
    async fn read_bytes_swaps_per_register_when_little_endian() {
        let mut link = MockLink::new();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ]);
        let mut client = client_with(link);
        client.set_encoding(Endianness::Little, WordOrder::HighFirst);

        let bytes = client.read_bytes(0, 4, RegisterType::Holding).await.unwrap();
        assert_eq!(bytes, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[tokio::test]
    async fn read_bytes_truncates_odd_quantities() {
        let mut link = MockLink::new();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ]);
        let mut client = client_with(link);

        let bytes = client
            .read_raw_bytes(0, 3, RegisterType::Holding)
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x12, 0x34, 0x56]);
    }

    #[tokio::test]
    async fn write_bytes_pads_odd_lengths() {
        let mut link = MockLink::new();
        let tx = link.tx_handle();
        link.feed(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x10, 0x00, 0x02,
        ]);
        let mut client = client_with(link);

        client.write_bytes(0x0010, &[0xAA, 0xBB, 0xCC]).await.unwrap();
        assert_eq!(
            tx.lock().unwrap().as_slice(),
            &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x10, 0x00, 0x10, 0x00, 0x02, 0x04,
                0xAA, 0xBB, 0xCC, 0x00
            ]
        );
    }
}
