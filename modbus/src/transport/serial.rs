use super::link::{timed_out, Link};
use async_trait::async_trait;
use log::error;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};

pub struct SerialSettings {
    pub device: String,
    pub speed: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

/// Serial line as a deadline-aware byte channel. The OS driver's poll
/// granularity stays below this interface; callers only see reads that
/// either deliver bytes or time out at the deadline.
pub struct SerialLink {
    port: SerialStream,
    deadline: Instant,
}

impl SerialLink {
    pub fn open(settings: &SerialSettings) -> Result<SerialLink, io::Error> {
        let port = tokio_serial::new(&settings.device, settings.speed)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .open_native_async()
            .map_err(|err| {
                error!("serial({}): {}", settings.device, err);
                io::Error::new(io::ErrorKind::NotFound, err)
            })?;

        // discard stale bytes sitting in the driver buffers
        port.clear(ClearBuffer::All).map_err(io::Error::other)?;

        Ok(SerialLink {
            port,
            deadline: Instant::now() + super::FOREVER,
        })
    }
}

#[async_trait]
impl Link for SerialLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match timeout_at(self.deadline, self.port.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match timeout_at(self.deadline, self.port.write_all(buf)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    async fn close(&mut self) -> io::Result<()> {
        self.port.shutdown().await
    }
}
