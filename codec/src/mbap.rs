//! MBAP framing: 7-byte header (transaction id, protocol id, length, unit id)
//! followed by the PDU. The length field counts bytes from the unit id
//! inclusive.
//!
//! Frames carrying an unknown protocol identifier are consumed whole before
//! the error is reported, so the caller can keep reading the stream and skip
//! them. Length violations are unrecoverable: the frame boundary is lost.

use crate::helpers;
use crate::pdu::{PduRequestCodec, PduResponseCodec};
use crate::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Buf, BytesMut};
use frame::data::Data;
use frame::{RequestFrame, RequestPdu, ResponseFrame, MAX_PDU_SIZE, MBAP_HEADER_LEN};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug)]
pub struct Header {
    pub id: u16,
    pub proto: u16,
    pub len: u16,
    pub slave: u8,
}

impl Header {
    pub fn new(id: u16, len: u16, slave: u8) -> Header {
        assert!(len >= 2);
        assert!(len as usize <= MAX_PDU_SIZE);
        Header {
            id,
            proto: 0,
            len,
            slave,
        }
    }
}

#[derive(Default)]
pub struct HeaderCodec;

impl Decoder for HeaderCodec {
    type Item = Header;
    type Error = Error;

    // Field extraction only. The protocol id is judged by the framing codecs
    // once the full frame is buffered, so that bad frames can be skipped.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MBAP_HEADER_LEN {
            return Ok(None);
        }
        let mut src = Cursor::new(src.as_ref());
        let id = src.read_u16::<BigEndian>().unwrap();
        let proto = src.read_u16::<BigEndian>().unwrap();
        let len = src.read_u16::<BigEndian>().unwrap();
        let slave = src.read_u8().unwrap();

        if len < 2 || len as usize > MAX_PDU_SIZE {
            return Err(Error::ProtocolError);
        }

        Ok(Some(Header {
            id,
            proto,
            len,
            slave,
        }))
    }
}

impl Encoder<Header> for HeaderCodec {
    type Error = Error;

    fn encode(&mut self, header: Header, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let dst = &mut Cursor::new(dst.as_mut());
        dst.write_u16::<BigEndian>(header.id)?;
        dst.write_u16::<BigEndian>(0)?;
        dst.write_u16::<BigEndian>(header.len)?;
        dst.write_u8(header.slave)?;
        Ok(())
    }
}

/// Client direction: requests out, responses in.
pub struct MbapClientCodec {
    name: String,
}

impl Default for MbapClientCodec {
    fn default() -> MbapClientCodec {
        MbapClientCodec::new("mbap-client")
    }
}

impl MbapClientCodec {
    pub fn new(name: &str) -> MbapClientCodec {
        MbapClientCodec {
            name: name.to_owned(),
        }
    }
}

impl Decoder for MbapClientCodec {
    type Item = ResponseFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        helpers::log_data(&self.name, "in", src);

        let Some(header) = HeaderCodec::default().decode(src)? else {
            return Ok(None);
        };

        let needed = (header.len - 1) as usize;
        if src.len() < MBAP_HEADER_LEN + needed {
            return Ok(None);
        }

        if header.proto != 0 {
            src.advance(MBAP_HEADER_LEN + needed);
            return Err(Error::UnknownProtocolId);
        }

        let pdu = PduResponseCodec::default()
            .parse(&src.as_ref()[MBAP_HEADER_LEN..MBAP_HEADER_LEN + needed])?;
        src.advance(MBAP_HEADER_LEN + needed);
        Ok(Some(ResponseFrame::from_parts(header.id, header.slave, pdu)))
    }
}

impl Encoder<RequestFrame> for MbapClientCodec {
    type Error = Error;

    fn encode(&mut self, msg: RequestFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_size = msg.pdu.len() + 1;
        let full_size = 6 + payload_size;
        dst.resize(full_size, 0);

        let header = Header::new(msg.id, payload_size as u16, msg.slave);
        HeaderCodec::default().encode(header, dst)?;

        let mut body = dst.split_off(MBAP_HEADER_LEN);
        PduRequestCodec::default().encode(msg.pdu, &mut body)?;
        dst.unsplit(body);

        helpers::log_data(&self.name, "out", dst);
        Ok(())
    }
}

/// Server direction: requests in, responses out. Incoming PDUs are delivered
/// raw; the request dispatcher owns the per-function field validation.
pub struct MbapServerCodec {
    name: String,
}

impl Default for MbapServerCodec {
    fn default() -> MbapServerCodec {
        MbapServerCodec::new("mbap-server")
    }
}

impl MbapServerCodec {
    pub fn new(name: &str) -> MbapServerCodec {
        MbapServerCodec {
            name: name.to_owned(),
        }
    }
}

impl Decoder for MbapServerCodec {
    type Item = RequestFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        helpers::log_data(&self.name, "in", src);

        let Some(header) = HeaderCodec::default().decode(src)? else {
            return Ok(None);
        };

        let needed = (header.len - 1) as usize;
        if src.len() < MBAP_HEADER_LEN + needed {
            return Ok(None);
        }

        if header.proto != 0 {
            src.advance(MBAP_HEADER_LEN + needed);
            return Err(Error::UnknownProtocolId);
        }

        let function = src[MBAP_HEADER_LEN];
        let data = Data::raw(&src.as_ref()[MBAP_HEADER_LEN + 1..MBAP_HEADER_LEN + needed]);
        src.advance(MBAP_HEADER_LEN + needed);

        Ok(Some(RequestFrame::from_parts(
            header.id,
            header.slave,
            RequestPdu::raw(function, data),
        )))
    }
}

impl Encoder<ResponseFrame> for MbapServerCodec {
    type Error = Error;

    fn encode(&mut self, msg: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_size = msg.pdu.len() + 1;
        let full_size = 6 + payload_size;
        dst.resize(full_size, 0);

        let header = Header::new(msg.id, payload_size as u16, msg.slave);
        HeaderCodec::default().encode(header, dst)?;

        let mut body = dst.split_off(MBAP_HEADER_LEN);
        PduResponseCodec::default().encode(msg.pdu, &mut body)?;
        dst.unsplit(body);

        helpers::log_data(&self.name, "out", dst);
        Ok(())
    }
}
