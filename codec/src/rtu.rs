//! RTU framing: `unit id | function | payload | crc_lo | crc_hi`.
//!
//! The decoder handles the client side of the exchange: responses coming back
//! from a device. Frame boundaries are found with a fixed per-function length
//! table rather than by watching the line go quiet, so devices answering
//! faster than the standard inter-frame gap still parse cleanly.

use crate::crc::Crc;
use crate::helpers;
use crate::pdu::{PduRequestCodec, PduResponseCodec};
use crate::Error;
use bytes::{Buf, BytesMut};
use frame::{RequestFrame, ResponseFrame, MAX_RTU_FRAME_SIZE};
use tokio_util::codec::{Decoder, Encoder};

pub struct RtuCodec {
    name: String,
}

impl Default for RtuCodec {
    fn default() -> RtuCodec {
        RtuCodec::new("rtu")
    }
}

impl RtuCodec {
    pub fn new(name: &str) -> RtuCodec {
        RtuCodec {
            name: name.to_owned(),
        }
    }
}

/// Bytes remaining after the three header bytes (unit id, function code and
/// the first payload byte), CRC excluded. The first payload byte doubles as
/// the byte count for read responses and as the exception code for errors.
fn expected_response_len(func: u8, first_payload_byte: u8) -> Result<usize, Error> {
    match func {
        0x1 | 0x2 | 0x3 | 0x4 => Ok(first_payload_byte as usize),
        0x5 | 0x6 | 0xF | 0x10 => Ok(3),
        0x16 => Ok(5),
        0x81 | 0x82 | 0x83 | 0x84 | 0x85 | 0x86 | 0x8F | 0x90 | 0x96 => Ok(0),
        _ => Err(Error::ProtocolError),
    }
}

impl Decoder for RtuCodec {
    type Item = ResponseFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        helpers::log_data(&self.name, "in", src);

        if src.len() < 3 {
            return Ok(None);
        }

        let result = self.decode_inner(src);
        if result.is_err() {
            src.clear();
        }
        result
    }
}

impl RtuCodec {
    fn decode_inner(&mut self, src: &mut BytesMut) -> Result<Option<ResponseFrame>, Error> {
        let slave = src[0];
        let needed = expected_response_len(src[1], src[2])?;
        let total = 3 + needed + 2;

        if total > MAX_RTU_FRAME_SIZE {
            return Err(Error::ProtocolError);
        }

        if src.len() < total {
            return Ok(None);
        }

        let mut crc = Crc::init();
        crc.add(&src.as_ref()[..total - 2]);
        if !crc.is_equal(src[total - 2], src[total - 1]) {
            return Err(Error::BadCrc);
        }

        let pdu = PduResponseCodec::default().parse(&src.as_ref()[1..total - 2])?;
        src.advance(total);
        Ok(Some(ResponseFrame::new(slave, pdu)))
    }
}

impl Encoder<RequestFrame> for RtuCodec {
    type Error = Error;

    fn encode(&mut self, msg: RequestFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let pdu_len = msg.pdu.len();
        let full_len = pdu_len + 3;
        dst.resize(full_len, 0);

        let mut crc_bytes = dst.split_off(full_len - 2);
        let mut body = dst.split_off(1);
        dst[0] = msg.slave;

        let result = PduRequestCodec::default().encode(msg.pdu, &mut body);

        let mut crc = Crc::init();
        crc.add(dst.as_ref());
        crc.add(body.as_ref());
        crc_bytes.copy_from_slice(&crc.value());

        dst.unsplit(body);
        dst.unsplit(crc_bytes);

        helpers::log_data(&self.name, "out", dst);
        result
    }
}
