//! Clients over the tunneled transports: RTU frames through TCP and UDP
//! sockets, MBAP through UDP datagrams.

use modbus::prelude::*;
use modbus::RegisterType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

fn crc(bytes: &[u8]) -> [u8; 2] {
    let mut reg: u16 = 0xFFFF;
    for byte in bytes {
        reg ^= u16::from(*byte);
        for _ in 0..8 {
            if reg & 1 != 0 {
                reg = reg >> 1 ^ 0xA001;
            } else {
                reg >>= 1;
            }
        }
    }
    reg.to_le_bytes()
}

/// An RTU device behind TCP that echoes write-single-register requests
/// verbatim, the way real devices acknowledge function 0x06.
#[tokio::test]
async fn rtu_over_tcp_write_single_register() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("rtuovertcp://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut frame = [0u8; 8];
        stream.read_exact(&mut frame).await.unwrap();

        // unit 1, function 0x06, address 0x0002, value 0x0605, valid crc
        assert_eq!(&frame[..6], &[0x01, 0x06, 0x00, 0x02, 0x06, 0x05]);
        assert_eq!(&frame[6..], &crc(&frame[..6]));

        stream.write_all(&frame).await.unwrap();
    });

    let mut client = Client::new(ClientConfig {
        url,
        ..ClientConfig::default()
    })
    .unwrap();
    client.open().await.unwrap();

    client.write_register(0x0002, 0x0605).await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn rtu_over_udp_read_holding_registers() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = format!("rtuoverudp://{}", socket.local_addr().unwrap());

    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let (nbytes, peer) = socket.recv_from(&mut buf).await.unwrap();

        // unit 1, function 0x03, address 0x1000, quantity 2
        assert_eq!(&buf[..6], &[0x01, 0x03, 0x10, 0x00, 0x00, 0x02]);
        assert_eq!(&buf[6..nbytes], &crc(&buf[..6]));

        let mut response = vec![0x01u8, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78];
        let check = crc(&response);
        response.extend_from_slice(&check);
        socket.send_to(&response, peer).await.unwrap();
    });

    let mut client = Client::new(ClientConfig {
        url,
        ..ClientConfig::default()
    })
    .unwrap();
    client.open().await.unwrap();

    let values = client
        .read_registers(0x1000, 2, RegisterType::Holding)
        .await
        .unwrap();
    assert_eq!(values, vec![0x1234, 0x5678]);
    client.close().await.unwrap();
}

#[tokio::test]
async fn mbap_over_udp_read_holding_registers() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = format!("udp://{}", socket.local_addr().unwrap());

    tokio::spawn(async move {
        let mut buf = [0u8; 260];
        let (nbytes, peer) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(nbytes, 12);

        // header minus the transaction id, then the read request
        assert_eq!(&buf[2..6], &[0x00, 0x00, 0x00, 0x06]);
        assert_eq!(&buf[6..12], &[0x01, 0x03, 0x10, 0x00, 0x00, 0x02]);

        let response = [
            buf[0], buf[1], 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
        ];
        socket.send_to(&response, peer).await.unwrap();
    });

    let mut client = Client::new(ClientConfig {
        url,
        ..ClientConfig::default()
    })
    .unwrap();
    client.open().await.unwrap();

    let values = client
        .read_registers(0x1000, 2, RegisterType::Holding)
        .await
        .unwrap();
    assert_eq!(values, vec![0x1234, 0x5678]);
    client.close().await.unwrap();
}

/// One datagram carrying two MBAP frames: the stale response is skipped by
/// the transaction id filter, the matching one is returned, and the
/// byte-stream adapter hands the framer the datagram in arbitrary chunks.
#[tokio::test]
async fn mbap_over_udp_skips_stale_transaction() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = format!("udp://{}", socket.local_addr().unwrap());

    tokio::spawn(async move {
        let mut buf = [0u8; 260];
        let (_, peer) = socket.recv_from(&mut buf).await.unwrap();

        let txn = u16::from_be_bytes([buf[0], buf[1]]);
        let stale = txn.wrapping_add(1).to_be_bytes();

        let mut payload = Vec::new();
        payload.extend_from_slice(&[
            stale[0], stale[1], 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01,
        ]);
        payload.extend_from_slice(&[
            buf[0], buf[1], 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x0D,
        ]);
        socket.send_to(&payload, peer).await.unwrap();
    });

    let mut client = Client::new(ClientConfig {
        url,
        ..ClientConfig::default()
    })
    .unwrap();
    client.open().await.unwrap();

    let values = client.read_coils(0, 4).await.unwrap();
    assert_eq!(values, vec![true, false, true, true]);
    client.close().await.unwrap();
}
