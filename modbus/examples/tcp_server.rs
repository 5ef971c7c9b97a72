//! Minimal modbus server.
//!
//! Exposes 100 read/write coils, a few holding registers and an uptime
//! counter in input registers 200-201. Run with
//! `cargo run --example tcp_server`, then point any modbus client at
//! `tcp://localhost:5502`.

use modbus::prelude::*;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio::time::{interval, Duration};

struct ExampleHandler {
    // handler methods are called from one task per client, so shared state
    // sits behind a lock
    coils: Mutex<[bool; 100]>,
    holding: Mutex<[u16; 10]>,
    uptime: Mutex<u32>,
}

impl ExampleHandler {
    fn new() -> ExampleHandler {
        ExampleHandler {
            coils: Mutex::new([false; 100]),
            holding: Mutex::new([0; 10]),
            uptime: Mutex::new(0),
        }
    }
}

impl RequestHandler for ExampleHandler {
    // 100 read/write coils at addresses 0-99
    fn handle_coils(&self, req: &CoilsRequest) -> Result<Vec<bool>, Error> {
        if req.unit_id != 1 {
            return Err(Error::IllegalFunction);
        }

        let mut coils = self.coils.lock().unwrap();
        let start = req.addr as usize;
        let end = start + req.quantity as usize;
        if end > coils.len() {
            return Err(Error::IllegalDataAddress);
        }

        if req.is_write {
            coils[start..end].copy_from_slice(&req.args);
        }
        Ok(coils[start..end].to_vec())
    }

    // this device has no discrete inputs
    fn handle_discrete_inputs(&self, _req: &DiscreteInputsRequest) -> Result<Vec<bool>, Error> {
        Err(Error::IllegalFunction)
    }

    // 10 read/write holding registers at addresses 0-9
    fn handle_holding_registers(&self, req: &HoldingRegistersRequest) -> Result<Vec<u16>, Error> {
        if req.unit_id != 1 {
            return Err(Error::IllegalFunction);
        }

        let mut holding = self.holding.lock().unwrap();
        let start = req.addr as usize;
        let end = start + req.quantity as usize;
        if end > holding.len() {
            return Err(Error::IllegalDataAddress);
        }

        if req.is_write {
            holding[start..end].copy_from_slice(&req.args);
        }
        Ok(holding[start..end].to_vec())
    }

    // the uptime counter lives in input registers 200-201, high word first
    fn handle_input_registers(&self, req: &InputRegistersRequest) -> Result<Vec<u16>, Error> {
        let uptime = *self.uptime.lock().unwrap();

        (req.addr..req.addr.wrapping_add(req.quantity))
            .map(|addr| match addr {
                200 => Ok((uptime >> 16) as u16),
                201 => Ok(uptime as u16),
                _ => Err(Error::IllegalDataAddress),
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let handler = Arc::new(ExampleHandler::new());
    let mut server = Server::new(
        ServerConfig {
            url: "tcp://localhost:5502".to_owned(),
            timeout: Some(Duration::from_secs(30)),
            max_clients: 5,
            ..ServerConfig::default()
        },
        handler.clone(),
    )?;

    server.start().await?;
    println!("listening on tcp://localhost:5502, press ctrl+c to exit");

    let mut tick = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                *handler.uptime.lock().unwrap() += 1;
            }
            _ = signal::ctrl_c() => {
                break;
            }
        }
    }

    server.stop().await?;
    Ok(())
}
