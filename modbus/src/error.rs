use frame::exception::Code;
use std::io;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    // configuration and usage
    #[error("configuration error")]
    Configuration,
    #[error("unexpected parameters")]
    UnexpectedParameters,
    #[error("transport is already open")]
    TransportIsAlreadyOpen,
    #[error("transport is already closed")]
    TransportIsAlreadyClosed,
    #[error("unimplemented")]
    Unimplemented,

    // transport
    #[error("request timed out")]
    RequestTimedOut,
    #[error("i/o error: {0:?}")]
    Io(io::ErrorKind),

    // framing
    #[error("bad crc")]
    BadCrc,
    #[error("short frame")]
    ShortFrame,
    #[error("protocol error")]
    ProtocolError,
    #[error("unknown protocol identifier")]
    UnknownProtocolId,
    #[error("bad unit id")]
    BadUnitId,
    #[error("bad transaction id")]
    BadTransactionId,

    // modbus exceptions
    #[error("illegal function")]
    IllegalFunction,
    #[error("illegal data address")]
    IllegalDataAddress,
    #[error("illegal data value")]
    IllegalDataValue,
    #[error("server device failure")]
    ServerDeviceFailure,
    #[error("request acknowledged")]
    Acknowledge,
    #[error("server device busy")]
    ServerDeviceBusy,
    #[error("memory parity error")]
    MemoryParityError,
    #[error("gateway path unavailable")]
    GatewayPathUnavailable,
    #[error("gateway target device failed to respond")]
    GatewayTargetFailedToRespond,
}

impl Error {
    /// Typed error for an exception code received from a server.
    pub fn from_exception(code: Code) -> Error {
        match code {
            Code::IllegalFunction => Error::IllegalFunction,
            Code::IllegalDataAddress => Error::IllegalDataAddress,
            Code::IllegalDataValue => Error::IllegalDataValue,
            Code::ServerDeviceFailure => Error::ServerDeviceFailure,
            Code::Acknowledge => Error::Acknowledge,
            Code::ServerDeviceBusy => Error::ServerDeviceBusy,
            Code::MemoryParityError => Error::MemoryParityError,
            Code::GatewayPathUnavailable => Error::GatewayPathUnavailable,
            Code::GatewayTargetFailedToRespond => Error::GatewayTargetFailedToRespond,
        }
    }

    /// Exception code the server answers with for a handler error. Anything
    /// that is not a modbus error maps to a server device failure.
    pub fn to_exception(&self) -> Code {
        match self {
            Error::IllegalFunction => Code::IllegalFunction,
            Error::IllegalDataAddress => Code::IllegalDataAddress,
            Error::IllegalDataValue => Code::IllegalDataValue,
            Error::ServerDeviceFailure => Code::ServerDeviceFailure,
            Error::Acknowledge => Code::Acknowledge,
            Error::ServerDeviceBusy => Code::ServerDeviceBusy,
            Error::MemoryParityError => Code::MemoryParityError,
            Error::GatewayPathUnavailable => Code::GatewayPathUnavailable,
            Error::GatewayTargetFailedToRespond => Code::GatewayTargetFailedToRespond,
            _ => Code::ServerDeviceFailure,
        }
    }
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Error {
        match error {
            codec::Error::BadCrc => Error::BadCrc,
            codec::Error::ShortFrame => Error::ShortFrame,
            codec::Error::ProtocolError => Error::ProtocolError,
            codec::Error::UnknownProtocolId => Error::UnknownProtocolId,
            codec::Error::BufferTooSmall => Error::ProtocolError,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::RequestTimedOut,
            kind => Error::Io(kind),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exception_mapping_both_ways() {
        let pairs = [
            (Code::IllegalFunction, Error::IllegalFunction),
            (Code::IllegalDataAddress, Error::IllegalDataAddress),
            (Code::IllegalDataValue, Error::IllegalDataValue),
            (Code::ServerDeviceFailure, Error::ServerDeviceFailure),
            (Code::Acknowledge, Error::Acknowledge),
            (Code::ServerDeviceBusy, Error::ServerDeviceBusy),
            (Code::MemoryParityError, Error::MemoryParityError),
            (Code::GatewayPathUnavailable, Error::GatewayPathUnavailable),
            (
                Code::GatewayTargetFailedToRespond,
                Error::GatewayTargetFailedToRespond,
            ),
        ];
        for (code, err) in pairs {
            assert_eq!(Error::from_exception(code), err);
            assert_eq!(err.to_exception(), code);
        }
    }

    #[test]
    fn non_modbus_errors_become_device_failure() {
        assert_eq!(Error::ProtocolError.to_exception(), Code::ServerDeviceFailure);
        assert_eq!(
            Error::RequestTimedOut.to_exception(),
            Code::ServerDeviceFailure
        );
    }

    #[test]
    fn io_timeouts_normalize() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "");
        assert_eq!(Error::from(err), Error::RequestTimedOut);

        let err = io::Error::new(io::ErrorKind::ConnectionReset, "");
        assert_eq!(Error::from(err), Error::Io(io::ErrorKind::ConnectionReset));
    }
}
