use super::link::Link;
use crate::error::Error;
use bytes::BytesMut;
use codec::rtu::RtuCodec;
use frame::{RequestFrame, ResponseFrame, MAX_RTU_FRAME_SIZE};
use log::warn;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tokio_util::codec::{Decoder, Encoder};

/// RTU exchange over a byte channel: strictly half-duplex, one request on
/// the wire at a time, silence gaps between frames per the serial line
/// discipline.
pub struct RtuTransport {
    link: Box<dyn Link>,
    name: String,
    timeout: Duration,
    t1: Duration,
    t35: Duration,
    last_activity: Instant,
    buffer: BytesMut,
}

impl RtuTransport {
    pub fn new(link: Box<dyn Link>, name: &str, speed: u32, timeout: Duration) -> RtuTransport {
        let t1 = char_time(speed);

        // above 19200 bauds the modbus-over-serial-line document pins the
        // inter-frame gap at 1750 us, below it stays at 3.5 character times
        let t35 = if speed >= 19200 {
            Duration::from_micros(1750)
        } else {
            t1.mul_f64(3.5)
        };

        RtuTransport {
            link,
            name: format!("rtu({})", name),
            timeout,
            t1,
            t35,
            last_activity: Instant::now(),
            buffer: BytesMut::with_capacity(MAX_RTU_FRAME_SIZE),
        }
    }

    pub async fn execute_request(&mut self, req: RequestFrame) -> Result<ResponseFrame, Error> {
        self.link.set_deadline(Instant::now() + self.timeout);

        // if the line was active less than t3.5 ago, let the gap expire
        // before transmitting
        sleep_until(self.last_activity + self.t35).await;

        let mut codec = RtuCodec::new(&self.name);
        let mut txbuf = BytesMut::with_capacity(MAX_RTU_FRAME_SIZE);
        codec.encode(req, &mut txbuf)?;

        let ts = Instant::now();
        self.link.write_all(&txbuf).await?;

        // writes are usually buffered and return before the line drains;
        // estimate how long it stays busy
        self.last_activity = ts + self.t1 * txbuf.len() as u32;
        sleep_until(self.last_activity + self.t35).await;

        let result = self.read_frame(&mut codec).await;

        if matches!(
            result,
            Err(Error::BadCrc) | Err(Error::ProtocolError) | Err(Error::ShortFrame)
        ) {
            // wait out a full frame time and flush whatever is still coming
            // off the line so both ends can re-sync
            sleep(self.t1 * MAX_RTU_FRAME_SIZE as u32).await;
            self.drain().await;
        }

        if !matches!(result, Err(Error::RequestTimedOut)) {
            self.last_activity = Instant::now();
        }

        result
    }

    /// Reading requests from RTU links is not supported; serving is a
    /// TCP-family feature.
    pub async fn read_request(&mut self) -> Result<RequestFrame, Error> {
        Err(Error::Unimplemented)
    }

    pub async fn write_response(&mut self, _res: ResponseFrame) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        self.link.close().await.map_err(Error::from)
    }

    async fn read_frame(&mut self, codec: &mut RtuCodec) -> Result<ResponseFrame, Error> {
        self.buffer.clear();
        let mut chunk = [0u8; MAX_RTU_FRAME_SIZE];
        loop {
            if let Some(frame) = codec.decode(&mut self.buffer)? {
                return Ok(frame);
            }
            let nbytes = self.link.read(&mut chunk).await?;
            if nbytes == 0 {
                return Err(Error::ShortFrame);
            }
            self.buffer.extend_from_slice(&chunk[..nbytes]);
        }
    }

    /// Discards up to 1 KiB of late input.
    async fn drain(&mut self) {
        let mut discarded = 0;
        let mut chunk = [0u8; 256];
        self.link
            .set_deadline(Instant::now() + Duration::from_micros(500));
        while discarded < 1024 {
            match self.link.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(nbytes) => discarded += nbytes,
            }
        }
        if discarded > 0 {
            warn!("{} discarded {} bytes while re-syncing", self.name, discarded);
        }
        self.buffer.clear();
    }
}

/// Time to move one character at the given baud rate: start bit, 8 data
/// bits, parity or stop bit, stop bit.
fn char_time(speed: u32) -> Duration {
    Duration::from_secs_f64(11.0 / speed as f64)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::link::mock::MockLink;
    use codec::crc;
    use frame::{RequestPdu, ResponsePdu};

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut out = body.to_vec();
        out.extend_from_slice(&crc::calc(body).to_le_bytes());
        out
    }

    fn transport_with(link: MockLink) -> RtuTransport {
        RtuTransport::new(Box::new(link), "mock", 19200, Duration::from_millis(300))
    }

    #[tokio::test]
    async fn write_single_register_echo() {
        let mut link = MockLink::new();
        link.feed(&framed(&[0x01, 0x06, 0x00, 0x02, 0x06, 0x05]));
        let mut transport = transport_with(link);

        let req = RequestFrame::new(0x01, RequestPdu::write_single_register(0x0002, 0x0605));
        let res = transport.execute_request(req).await.unwrap();

        assert_eq!(res.slave, 0x01);
        assert_eq!(
            res.pdu,
            ResponsePdu::WriteSingleRegister {
                address: 0x0002,
                value: 0x0605
            }
        );
    }

    #[tokio::test]
    async fn response_split_across_reads() {
        let frame = framed(&[0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78]);
        let mut link = MockLink::new();
        link.feed(&frame[..3]);
        link.feed(&frame[3..]);
        let mut transport = transport_with(link);

        let req = RequestFrame::new(0x01, RequestPdu::read_holding_registers(0x1000, 2));
        let res = transport.execute_request(req).await.unwrap();
        match res.pdu {
            ResponsePdu::ReadHoldingRegisters { data } => {
                assert_eq!(data.get_u16(0).unwrap(), 0x1234);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn exception_response() {
        let mut link = MockLink::new();
        link.feed(&[0x31, 0x82, 0x02, 0xC1, 0x6E]);
        let mut transport = transport_with(link);

        let req = RequestFrame::new(0x31, RequestPdu::read_discrete_inputs(0x0000, 1));
        let res = transport.execute_request(req).await.unwrap();
        assert_eq!(res.slave, 0x31);
        match res.pdu {
            ResponsePdu::Exception { function, code } => {
                assert_eq!(function, 0x82);
                assert_eq!(code, frame::exception::Code::IllegalDataAddress);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn bad_crc_reports_and_drains() {
        let mut bad = framed(&[0x01, 0x03, 0x02, 0x12, 0x34]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        let mut link = MockLink::new();
        link.feed(&bad);
        link.feed(&[0xAA, 0xBB]); // late garbage, eaten by the re-sync drain
        let mut transport = transport_with(link);

        let req = RequestFrame::new(0x01, RequestPdu::read_holding_registers(0, 1));
        let err = transport.execute_request(req).await.err().unwrap();
        assert_eq!(err, Error::BadCrc);
        assert!(transport.buffer.is_empty());
    }

    #[tokio::test]
    async fn request_timeout() {
        let transport = &mut transport_with(MockLink::new());
        let req = RequestFrame::new(0x01, RequestPdu::read_coils(0, 1));
        let err = transport.execute_request(req).await.err().unwrap();
        assert_eq!(err, Error::RequestTimedOut);
    }

    #[tokio::test]
    async fn server_side_is_unsupported() {
        let transport = &mut transport_with(MockLink::new());
        assert_eq!(
            transport.read_request().await.err().unwrap(),
            Error::Unimplemented
        );
    }

    #[test]
    fn timing_parameters() {
        let fast = RtuTransport::new(
            Box::new(MockLink::new()),
            "fast",
            115200,
            Duration::from_millis(10),
        );
        assert_eq!(fast.t35, Duration::from_micros(1750));

        let slow = RtuTransport::new(
            Box::new(MockLink::new()),
            "slow",
            9600,
            Duration::from_millis(10),
        );
        // 11 bits at 9600 bauds is ~1.146 ms per character
        assert!(slow.t1 > Duration::from_micros(1100));
        assert!(slow.t1 < Duration::from_micros(1200));
        assert_eq!(slow.t35, slow.t1.mul_f64(3.5));
    }
}
