//! Minimal modbus client.
//!
//! Talks to the tcp_server example: writes a few registers and coils and
//! reads them back. Run the server first, then
//! `cargo run --example tcp_client`.

use modbus::prelude::*;
use modbus::RegisterType;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut client = Client::new(ClientConfig {
        url: "tcp://localhost:5502".to_owned(),
        ..ClientConfig::default()
    })?;

    client.open().await?;
    client.set_unit_id(1);

    // single and multiple holding register writes
    client.write_register(0, 0x0102).await?;
    client.write_registers(1, &[0xAABB, 0xCCDD]).await?;
    let regs = client.read_registers(0, 3, RegisterType::Holding).await?;
    println!("holding registers 0-2: {:04x?}", regs);

    // a 32-bit value spans registers 4-5
    client.write_u32(4, 0xDEADBEEF).await?;
    println!(
        "holding registers 4-5 as u32: {:#010x}",
        client.read_u32(4, RegisterType::Holding).await?
    );

    // coils
    client.write_coils(10, &[true, false, true]).await?;
    println!("coils 10-12: {:?}", client.read_coils(10, 3).await?);

    // the server exposes its uptime in input registers 200-201
    println!(
        "server uptime: {}s",
        client.read_u32(200, RegisterType::Input).await?
    );

    client.close().await?;
    Ok(())
}
