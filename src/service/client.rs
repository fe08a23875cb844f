//! Minimal framed client.
//!
//! Speaks the engine's wire format: optional handshake first, then
//! length-prefixed messages. Used by applications embedding the engine and
//! by the integration tests.

use crate::config::MAX_MESSAGE_SIZE;
use crate::core::frame;
use crate::error::{EngineError, Result};
use crate::protocol::handshake;
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Client side of a framed connection.
pub struct Client {
    stream: TcpStream,
    max_message_size: usize,
}

impl Client {
    /// Connect to a server.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(EngineError::Connect)?;
        Ok(Self {
            stream,
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Override the maximum accepted response size.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Complete the handshake exchange with the configured token.
    pub async fn handshake(&mut self, token: &[u8]) -> Result<()> {
        handshake::client_side(&mut self.stream, token).await
    }

    /// Send one framed message body.
    pub async fn send(&mut self, body: &[u8]) -> Result<()> {
        frame::check_length(body.len(), self.max_message_size)?;

        let mut out = BytesMut::new();
        frame::encode_frame(body, &mut out);
        self.stream.write_all(&out).await.map_err(EngineError::Write)?;
        self.stream.flush().await.map_err(EngineError::Write)?;
        Ok(())
    }

    /// Receive one framed message body.
    pub async fn recv(&mut self) -> Result<Bytes> {
        let mut prefix = [0u8; frame::LENGTH_PREFIX_LEN];
        match self.stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(EngineError::PeerDisconnected)
            }
            Err(e) => return Err(EngineError::Read(e)),
        }

        let body_len = frame::decode_length(prefix) as usize;
        frame::check_length(body_len, self.max_message_size)?;

        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            match self.stream.read_exact(&mut body).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(EngineError::PeerDisconnected)
                }
                Err(e) => return Err(EngineError::Read(e)),
            }
        }
        Ok(Bytes::from(body))
    }

    /// Send a message and wait for its response.
    pub async fn request(&mut self, body: &[u8]) -> Result<Bytes> {
        self.send(body).await?;
        self.recv().await
    }
}
