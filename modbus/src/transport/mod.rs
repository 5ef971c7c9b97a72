pub mod link;
pub mod mbap;
pub mod rtu;
pub mod serial;
pub mod tls;
pub mod udp;

use crate::error::Error;
use frame::{RequestFrame, ResponseFrame};
use link::Link;
use mbap::MbapTransport;
use rtu::RtuTransport;
use tokio::time::Duration;

// placeholder deadline for links that have none set yet
pub(crate) const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// The closed set of framings over an open byte channel. Callers above this
/// point never distinguish RTU from MBAP.
pub enum Transport {
    Rtu(RtuTransport),
    Mbap(MbapTransport),
}

impl Transport {
    pub fn rtu(link: Box<dyn Link>, name: &str, speed: u32, timeout: Duration) -> Transport {
        Transport::Rtu(RtuTransport::new(link, name, speed, timeout))
    }

    pub fn mbap(link: Box<dyn Link>, name: &str, timeout: Duration) -> Transport {
        Transport::Mbap(MbapTransport::new(link, name, timeout))
    }

    /// Client path: frame and send the request, wait for the matching
    /// response. I/O deadline expiry surfaces as `RequestTimedOut`.
    pub async fn execute_request(&mut self, req: RequestFrame) -> Result<ResponseFrame, Error> {
        match self {
            Transport::Rtu(transport) => transport.execute_request(req).await,
            Transport::Mbap(transport) => transport.execute_request(req).await,
        }
    }

    /// Server path: wait for one request frame.
    pub async fn read_request(&mut self) -> Result<RequestFrame, Error> {
        match self {
            Transport::Rtu(transport) => transport.read_request().await,
            Transport::Mbap(transport) => transport.read_request().await,
        }
    }

    /// Server path: frame and send a response.
    pub async fn write_response(&mut self, res: ResponseFrame) -> Result<(), Error> {
        match self {
            Transport::Rtu(transport) => transport.write_response(res).await,
            Transport::Mbap(transport) => transport.write_response(res).await,
        }
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        match self {
            Transport::Rtu(transport) => transport.close().await,
            Transport::Mbap(transport) => transport.close().await,
        }
    }
}
