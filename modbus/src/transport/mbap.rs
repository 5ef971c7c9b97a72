use super::link::Link;
use crate::error::Error;
use bytes::BytesMut;
use codec::mbap::{MbapClientCodec, MbapServerCodec};
use frame::{RequestFrame, ResponseFrame, MAX_MBAP_FRAME_SIZE};
use log::warn;
use tokio::time::{Duration, Instant};
use tokio_util::codec::{Decoder, Encoder};

/// MBAP exchange over a byte channel. On the client side the transaction id
/// counter stamps outgoing requests and filters incoming frames; on the
/// server side it retains the id of the request being served so the
/// response can echo it.
pub struct MbapTransport {
    link: Box<dyn Link>,
    name: String,
    timeout: Duration,
    txn_id: u16,
    buffer: BytesMut,
}

impl MbapTransport {
    pub fn new(link: Box<dyn Link>, name: &str, timeout: Duration) -> MbapTransport {
        MbapTransport {
            link,
            name: format!("mbap({})", name),
            timeout,
            txn_id: 0,
            buffer: BytesMut::with_capacity(MAX_MBAP_FRAME_SIZE),
        }
    }

    pub async fn execute_request(&mut self, mut req: RequestFrame) -> Result<ResponseFrame, Error> {
        self.link.set_deadline(Instant::now() + self.timeout);

        self.txn_id = self.txn_id.wrapping_add(1);
        req.id = self.txn_id;

        let mut codec = MbapClientCodec::new(&self.name);
        let mut txbuf = BytesMut::with_capacity(MAX_MBAP_FRAME_SIZE);
        codec.encode(req, &mut txbuf)?;
        self.link.write_all(&txbuf).await?;

        self.read_response(&mut codec).await
    }

    pub async fn read_request(&mut self) -> Result<RequestFrame, Error> {
        self.link.set_deadline(Instant::now() + self.timeout);

        let mut codec = MbapServerCodec::new(&self.name);
        let mut chunk = [0u8; MAX_MBAP_FRAME_SIZE];
        loop {
            if let Some(frame) = codec.decode(&mut self.buffer)? {
                self.txn_id = frame.id;
                return Ok(frame);
            }
            let nbytes = self.link.read(&mut chunk).await?;
            if nbytes == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof));
            }
            self.buffer.extend_from_slice(&chunk[..nbytes]);
        }
    }

    pub async fn write_response(&mut self, mut res: ResponseFrame) -> Result<(), Error> {
        res.id = self.txn_id;
        let mut txbuf = BytesMut::with_capacity(MAX_MBAP_FRAME_SIZE);
        MbapServerCodec::new(&self.name).encode(res, &mut txbuf)?;
        self.link.write_all(&txbuf).await.map_err(Error::from)
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        self.link.close().await.map_err(Error::from)
    }

    /// Reads frames until one matches the outstanding transaction id.
    /// Frames from unknown protocols are skipped silently, stale transaction
    /// ids with a warning; both tolerate late replies from an earlier,
    /// abandoned request on a persistent connection.
    async fn read_response(&mut self, codec: &mut MbapClientCodec) -> Result<ResponseFrame, Error> {
        let mut chunk = [0u8; MAX_MBAP_FRAME_SIZE];
        loop {
            match codec.decode(&mut self.buffer) {
                Ok(Some(frame)) => {
                    if frame.id != self.txn_id {
                        warn!(
                            "{} unexpected transaction id (expected 0x{:04x}, received 0x{:04x})",
                            self.name, self.txn_id, frame.id
                        );
                        continue;
                    }
                    return Ok(frame);
                }
                Ok(None) => {
                    let nbytes = self.link.read(&mut chunk).await?;
                    if nbytes == 0 {
                        return Err(Error::Io(std::io::ErrorKind::UnexpectedEof));
                    }
                    self.buffer.extend_from_slice(&chunk[..nbytes]);
                }
                Err(codec::Error::UnknownProtocolId) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
