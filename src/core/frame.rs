//! Length-prefixed frame encoding.
//!
//! Every message on the wire is `[length_prefix][body]` where the prefix is
//! a fixed-width little-endian `u32` giving the exact byte length of the
//! body. The prefix length is validated against a configured cap before any
//! buffer is grown for the body.

use crate::error::{EngineError, Result};
use bytes::{BufMut, BytesMut};

/// Size of the length prefix preceding each message body.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Encode a body length into its wire representation.
#[inline]
pub fn encode_length(len: u32) -> [u8; LENGTH_PREFIX_LEN] {
    len.to_le_bytes()
}

/// Decode a wire length prefix into a body length.
#[inline]
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_LEN]) -> u32 {
    u32::from_le_bytes(prefix)
}

/// Validate a decoded body length against the configured cap.
///
/// Rejecting here, before the receive buffer grows, is what prevents a
/// hostile prefix from forcing an arbitrarily large allocation.
#[inline]
pub fn check_length(len: usize, max_message_size: usize) -> Result<()> {
    if len > max_message_size {
        return Err(EngineError::OversizedMessage(len));
    }
    Ok(())
}

/// Append a complete frame (prefix + body) to `dst`.
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) {
    dst.reserve(LENGTH_PREFIX_LEN + body.len());
    dst.put_slice(&encode_length(body.len() as u32));
    dst.put_slice(body);
}
