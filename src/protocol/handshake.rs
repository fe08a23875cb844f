//! Connection handshake.
//!
//! When configured, a newly accepted connection must complete one framed
//! exchange before any message is dispatched: the client sends the
//! configured token as its first message body, the server verifies it
//! byte-for-byte and echoes it back. The token content comes entirely from
//! configuration and is opaque to the engine.
//!
//! Handshake state is per-connection; both halves operate on the stream they
//! are given and hold nothing global.

use crate::config::HandshakeConfig;
use crate::core::frame;
use crate::error::{constants, EngineError, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Server half: verify the client's token and echo it back.
///
/// # Errors
/// `Handshake` on a token mismatch or a connection closed mid-exchange.
pub async fn server_side<S>(stream: &mut S, config: &HandshakeConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut prefix = [0u8; frame::LENGTH_PREFIX_LEN];
    stream
        .read_exact(&mut prefix)
        .await
        .map_err(|_| EngineError::Handshake(constants::ERR_HANDSHAKE_EOF.to_string()))?;

    let body_len = frame::decode_length(prefix) as usize;
    if body_len != config.token.len() {
        return Err(EngineError::Handshake(
            constants::ERR_HANDSHAKE_MISMATCH.to_string(),
        ));
    }

    let mut received = vec![0u8; body_len];
    stream
        .read_exact(&mut received)
        .await
        .map_err(|_| EngineError::Handshake(constants::ERR_HANDSHAKE_EOF.to_string()))?;

    if received != config.token {
        return Err(EngineError::Handshake(
            constants::ERR_HANDSHAKE_MISMATCH.to_string(),
        ));
    }

    let mut reply = BytesMut::new();
    frame::encode_frame(&config.token, &mut reply);
    stream.write_all(&reply).await.map_err(EngineError::Write)?;
    stream.flush().await.map_err(EngineError::Write)?;

    debug!("Handshake completed");
    Ok(())
}

/// Client half: send the token and verify the server's echo.
///
/// # Errors
/// `Handshake` if the server's echo does not match the token.
pub async fn client_side<S>(stream: &mut S, token: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = BytesMut::new();
    frame::encode_frame(token, &mut request);
    stream
        .write_all(&request)
        .await
        .map_err(EngineError::Write)?;
    stream.flush().await.map_err(EngineError::Write)?;

    let mut prefix = [0u8; frame::LENGTH_PREFIX_LEN];
    stream
        .read_exact(&mut prefix)
        .await
        .map_err(|_| EngineError::Handshake(constants::ERR_HANDSHAKE_EOF.to_string()))?;

    let body_len = frame::decode_length(prefix) as usize;
    if body_len != token.len() {
        return Err(EngineError::Handshake(
            constants::ERR_HANDSHAKE_MISMATCH.to_string(),
        ));
    }

    let mut echoed = vec![0u8; body_len];
    stream
        .read_exact(&mut echoed)
        .await
        .map_err(|_| EngineError::Handshake(constants::ERR_HANDSHAKE_EOF.to_string()))?;

    if echoed != token {
        return Err(EngineError::Handshake(
            constants::ERR_HANDSHAKE_MISMATCH.to_string(),
        ));
    }

    debug!("Handshake accepted by server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &[u8]) -> HandshakeConfig {
        HandshakeConfig {
            required: true,
            token: token.to_vec(),
        }
    }

    #[tokio::test]
    async fn matching_tokens_complete() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let cfg = config(b"SESAME");

        let server_task = tokio::spawn(async move { server_side(&mut server, &cfg).await });
        client_side(&mut client, b"SESAME").await.unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn mismatched_token_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let cfg = config(b"SESAME");

        let server_task = tokio::spawn(async move { server_side(&mut server, &cfg).await });

        let mut request = BytesMut::new();
        frame::encode_frame(b"WRONG!", &mut request);
        client.write_all(&request).await.unwrap();

        let err = server_task.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Handshake(_)));
    }

    #[tokio::test]
    async fn wrong_length_is_rejected_before_body() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let cfg = config(b"SESAME");

        let server_task = tokio::spawn(async move { server_side(&mut server, &cfg).await });

        // Length prefix announces a body longer than the token.
        client
            .write_all(&frame::encode_length(64))
            .await
            .unwrap();

        let err = server_task.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Handshake(_)));
    }

    #[tokio::test]
    async fn disconnect_mid_handshake_is_an_error() {
        let (client, mut server) = tokio::io::duplex(256);
        let cfg = config(b"SESAME");

        drop(client);
        let err = server_side(&mut server, &cfg).await.unwrap_err();
        assert!(matches!(err, EngineError::Handshake(_)));
    }
}
