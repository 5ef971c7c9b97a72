use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// Byte channel under a framer. One absolute deadline covers both reads and
/// writes; expiry surfaces as an `io::ErrorKind::TimedOut` error.
#[async_trait]
pub trait Link: Send {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn set_deadline(&mut self, deadline: Instant);
    async fn close(&mut self) -> io::Result<()>;
}

pub(crate) fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline reached")
}

pub struct TcpLink {
    stream: TcpStream,
    deadline: Instant,
}

impl TcpLink {
    pub fn new(stream: TcpStream) -> TcpLink {
        TcpLink {
            stream,
            deadline: Instant::now() + super::FOREVER,
        }
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match timeout_at(self.deadline, self.stream.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match timeout_at(self.deadline, self.stream.write_all(buf)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
