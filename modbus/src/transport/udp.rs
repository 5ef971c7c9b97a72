use super::link::{timed_out, Link};
use async_trait::async_trait;
use frame::MAX_MBAP_FRAME_SIZE;
use std::io;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Datagram socket exposed as a byte stream so the stream-oriented framers
/// can consume it byte by byte. A datagram that is only partially consumed
/// by a read keeps its remainder buffered for the next read.
pub struct UdpLink {
    socket: UdpSocket,
    rxbuf: [u8; MAX_MBAP_FRAME_SIZE],
    leftover: usize,
    deadline: Instant,
}

impl UdpLink {
    pub async fn connect(target: &str) -> io::Result<UdpLink> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;
        Ok(UdpLink {
            socket,
            rxbuf: [0u8; MAX_MBAP_FRAME_SIZE],
            leftover: 0,
            deadline: Instant::now() + super::FOREVER,
        })
    }
}

#[async_trait]
impl Link for UdpLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover == 0 {
            let received = match timeout_at(self.deadline, self.socket.recv(&mut self.rxbuf)).await
            {
                Ok(result) => result?,
                Err(_) => return Err(timed_out()),
            };
            self.leftover = received;
        }

        let copied = std::cmp::min(self.leftover, buf.len());
        buf[..copied].copy_from_slice(&self.rxbuf[..copied]);
        if self.leftover > copied {
            // move the remainder to the front for the next read
            self.rxbuf.copy_within(copied..self.leftover, 0);
        }
        self.leftover -= copied;
        Ok(copied)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let sent = match timeout_at(self.deadline, self.socket.send(buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out()),
        };
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "datagram truncated",
            ));
        }
        Ok(())
    }

    fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
