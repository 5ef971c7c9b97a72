use std::convert::From;
use std::{fmt, io};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// CRC of a received RTU frame does not match
    BadCrc,
    /// frame ended before all announced bytes arrived
    ShortFrame,
    /// malformed field: bad length, bad byte count, unknown function code
    ProtocolError,
    /// MBAP protocol identifier is not 0x0000
    UnknownProtocolId,
    /// destination buffer cannot hold the frame
    BufferTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Error::BadCrc => "bad crc",
            Error::ShortFrame => "short frame",
            Error::ProtocolError => "protocol error",
            Error::UnknownProtocolId => "unknown protocol identifier",
            Error::BufferTooSmall => "buffer too small",
        };
        write!(f, "{}", text)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::InvalidData => Error::ProtocolError,
            io::ErrorKind::UnexpectedEof => Error::ShortFrame,
            _ => Error::BufferTooSmall,
        }
    }
}
