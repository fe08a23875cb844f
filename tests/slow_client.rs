//! Partial-read discipline: frames that arrive one byte at a time.
//!
//! A non-blocking socket can legitimately need many readiness events to
//! deliver one message. These tests trickle the prefix and body across
//! separate writes with pauses in between, so the server's reads return
//! would-block mid-frame, and assert the message still arrives intact.

use framelink::config::EngineConfig;
use framelink::protocol::Echo;
use framelink::service::Server;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread")]
async fn prefix_trickled_byte_by_byte() {
    let mut server = Server::new(EngineConfig::default(), Echo);
    let addr = server.start(0).await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Body "hi": prefix [2, 0, 0, 0], one byte per write.
    for byte in [2u8, 0, 0, 0] {
        stream.write_all(&[byte]).await.unwrap();
        stream.flush().await.unwrap();
        sleep(Duration::from_millis(20)).await;
    }
    stream.write_all(b"hi").await.unwrap();

    let mut response = [0u8; 6];
    stream.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, &[2, 0, 0, 0, b'h', b'i']);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn body_split_across_many_writes() {
    let mut server = Server::new(EngineConfig::default(), Echo);
    let addr = server.start(0).await.unwrap();

    let body: Vec<u8> = (0..64u8).collect();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .unwrap();
    for chunk in body.chunks(7) {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }

    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.unwrap();
    assert_eq!(u32::from_le_bytes(prefix) as usize, body.len());

    let mut echoed = vec![0u8; body.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, body);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_mid_prefix_releases_the_connection() {
    let mut server = Server::new(EngineConfig::default(), Echo);
    let addr = server.start(0).await.unwrap();
    let registry = server.registry();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Two of four prefix bytes, then gone.
    stream.write_all(&[5, 0]).await.unwrap();
    stream.flush().await.unwrap();
    drop(stream);

    // The driver must observe the disconnect and deregister.
    let deadline = tokio::time::timeout(Duration::from_secs(2), async {
        while !registry.is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(deadline.is_ok(), "stale registry entry after disconnect");

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pipelined_frames_in_one_write() {
    let mut server = Server::new(EngineConfig::default(), Echo);
    let addr = server.start(0).await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Two complete frames in a single write; each is consumed by its own
    // receive cycle.
    stream
        .write_all(&[1, 0, 0, 0, b'a', 3, 0, 0, 0, b'x', b'y', b'z'])
        .await
        .unwrap();

    let mut first = [0u8; 5];
    stream.read_exact(&mut first).await.unwrap();
    assert_eq!(&first, &[1, 0, 0, 0, b'a']);

    let mut second = [0u8; 7];
    stream.read_exact(&mut second).await.unwrap();
    assert_eq!(&second, &[3, 0, 0, 0, b'x', b'y', b'z']);

    server.shutdown().await.unwrap();
}
