use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Buf, BytesMut};
use frame::data::Data;
use frame::exception::Code;
use frame::{RequestPdu, ResponsePdu, COIL_OFF, COIL_ON};
use std::io::Cursor;
use tokio_util::codec::Encoder;

/// Encodes typed requests (client side). Incoming requests are framed by the
/// server codecs and decoded field-by-field in the server engine, so there is
/// no request decoder here.
#[derive(Default)]
pub struct PduRequestCodec;

impl Encoder<RequestPdu> for PduRequestCodec {
    type Error = Error;

    fn encode(&mut self, src: RequestPdu, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let dst = &mut Cursor::new(dst.as_mut());
        match src {
            RequestPdu::ReadCoils { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x1)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            RequestPdu::ReadDiscreteInputs { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x2)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            RequestPdu::ReadHoldingRegisters { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x3)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            RequestPdu::ReadInputRegisters { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x4)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            RequestPdu::WriteSingleCoil { address, value } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x5)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(if value { COIL_ON } else { COIL_OFF })?;
            }
            RequestPdu::WriteSingleRegister { address, value } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x6)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(value)?;
            }
            RequestPdu::WriteMultipleCoils {
                address,
                nobjs,
                data,
            } => {
                check_capacity(6 + data.len(), dst)?;
                dst.write_u8(0xF)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            RequestPdu::WriteMultipleRegisters {
                address,
                nobjs,
                data,
            } => {
                check_capacity(6 + data.len(), dst)?;
                dst.write_u8(0x10)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            RequestPdu::Raw { function, data } => {
                check_capacity(1 + data.len(), dst)?;
                dst.write_u8(function)?;
                write_data(&data, dst);
            }
        }
        Ok(())
    }
}

/// Encodes typed responses (server side) and parses complete response PDUs
/// (client side). The framers deliver the exact PDU byte range, so parsing
/// never sees partial input; any size mismatch is a protocol error.
#[derive(Default)]
pub struct PduResponseCodec;

impl PduResponseCodec {
    pub fn parse(&self, src: &[u8]) -> Result<ResponsePdu, Error> {
        let src = &mut Cursor::new(src);
        let func = src.read_u8().map_err(|_| Error::ProtocolError)?;

        if func & 0x80 != 0 {
            let code = src.read_u8().map_err(|_| Error::ProtocolError)?;
            check_consumed(src)?;
            let code = Code::try_from(code).map_err(|_| Error::ProtocolError)?;
            return Ok(ResponsePdu::Exception {
                function: func,
                code,
            });
        }

        match func {
            0x1 | 0x2 | 0x3 | 0x4 => {
                let nbytes = src.read_u8().map_err(|_| Error::ProtocolError)?;
                if src.remaining() != nbytes as usize {
                    return Err(Error::ProtocolError);
                }
                let mut data = Data::raw_empty(nbytes as usize);
                src.copy_to_slice(data.get_mut());
                Ok(match func {
                    0x1 => ResponsePdu::ReadCoils { data },
                    0x2 => ResponsePdu::ReadDiscreteInputs { data },
                    0x3 => ResponsePdu::ReadHoldingRegisters { data },
                    _ => ResponsePdu::ReadInputRegisters { data },
                })
            }
            0x5 => {
                let (address, value) = prefix_from_cursor(src)?;
                check_consumed(src)?;
                let value = match value {
                    COIL_ON => true,
                    COIL_OFF => false,
                    _ => return Err(Error::ProtocolError),
                };
                Ok(ResponsePdu::WriteSingleCoil { address, value })
            }
            0x6 => {
                let (address, value) = prefix_from_cursor(src)?;
                check_consumed(src)?;
                Ok(ResponsePdu::WriteSingleRegister { address, value })
            }
            0xF => {
                let (address, nobjs) = prefix_from_cursor(src)?;
                check_consumed(src)?;
                Ok(ResponsePdu::WriteMultipleCoils { address, nobjs })
            }
            0x10 => {
                let (address, nobjs) = prefix_from_cursor(src)?;
                check_consumed(src)?;
                Ok(ResponsePdu::WriteMultipleRegisters { address, nobjs })
            }
            _ => Err(Error::ProtocolError),
        }
    }
}

impl Encoder<ResponsePdu> for PduResponseCodec {
    type Error = Error;

    fn encode(&mut self, src: ResponsePdu, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let dst = &mut Cursor::new(dst.as_mut());
        match src {
            ResponsePdu::ReadCoils { data } => {
                check_capacity(data.len() + 2, dst)?;
                dst.write_u8(0x1)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            ResponsePdu::ReadDiscreteInputs { data } => {
                check_capacity(data.len() + 2, dst)?;
                dst.write_u8(0x2)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            ResponsePdu::ReadHoldingRegisters { data } => {
                check_capacity(data.len() + 2, dst)?;
                dst.write_u8(0x3)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            ResponsePdu::ReadInputRegisters { data } => {
                check_capacity(data.len() + 2, dst)?;
                dst.write_u8(0x4)?;
                dst.write_u8(data.len() as u8)?;
                write_data(&data, dst);
            }
            ResponsePdu::WriteSingleCoil { address, value } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x5)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(if value { COIL_ON } else { COIL_OFF })?;
            }
            ResponsePdu::WriteSingleRegister { address, value } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x6)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(value)?;
            }
            ResponsePdu::WriteMultipleCoils { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0xF)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            ResponsePdu::WriteMultipleRegisters { address, nobjs } => {
                check_capacity(5, dst)?;
                dst.write_u8(0x10)?;
                dst.write_u16::<BigEndian>(address)?;
                dst.write_u16::<BigEndian>(nobjs)?;
            }
            ResponsePdu::Exception { function, code } => {
                check_capacity(2, dst)?;
                dst.write_u8(function)?;
                dst.write_u8(code.into())?;
            }
        }
        Ok(())
    }
}

fn prefix_from_cursor(src: &mut Cursor<&[u8]>) -> Result<(u16, u16), Error> {
    if src.remaining() >= 4 {
        let v1 = src.read_u16::<BigEndian>().unwrap();
        let v2 = src.read_u16::<BigEndian>().unwrap();
        Ok((v1, v2))
    } else {
        Err(Error::ProtocolError)
    }
}

fn check_consumed(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    if src.remaining() == 0 {
        Ok(())
    } else {
        Err(Error::ProtocolError)
    }
}

fn check_capacity(requested: usize, dst: &mut Cursor<&mut [u8]>) -> Result<(), Error> {
    if requested > dst.remaining() {
        Err(Error::BufferTooSmall)
    } else {
        Ok(())
    }
}

fn write_data(data: &Data, dst: &mut Cursor<&mut [u8]>) {
    for i in 0..data.len() {
        dst.write_u8(data.get_u8(i).unwrap()).unwrap();
    }
}
