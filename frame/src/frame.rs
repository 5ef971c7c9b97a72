use super::pdu::{RequestPdu, ResponsePdu};

/// Request ADU without transport framing: transaction id (MBAP only),
/// unit id and the typed PDU.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RequestFrame {
    pub id: u16,
    pub slave: u8,
    pub pdu: RequestPdu,
}

impl RequestFrame {
    pub fn new(slave: u8, pdu: RequestPdu) -> RequestFrame {
        RequestFrame { id: 0, slave, pdu }
    }

    pub fn from_parts(id: u16, slave: u8, pdu: RequestPdu) -> RequestFrame {
        RequestFrame { id, slave, pdu }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResponseFrame {
    pub id: u16,
    pub slave: u8,
    pub pdu: ResponsePdu,
}

impl ResponseFrame {
    pub fn new(slave: u8, pdu: ResponsePdu) -> ResponseFrame {
        ResponseFrame { id: 0, slave, pdu }
    }

    pub fn from_parts(id: u16, slave: u8, pdu: ResponsePdu) -> ResponseFrame {
        ResponseFrame { id, slave, pdu }
    }
}
