//! Per-connection context lifecycle.
//!
//! Each accepted socket gets one [`ConnContext`] holding its receive buffer
//! and the running average of message body sizes that drives buffer
//! resizing. The context moves into the connection's driver task and is
//! never aliased: the single-ownership rule replaces any per-connection
//! lock. The buffer is released with the context when the driver finishes,
//! after the registry entry has already been removed.

use crate::config::BufferConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection handle, used as the registry key.
///
/// A typed wrapper rather than a bare integer so a descriptor can never be
/// confused with an arithmetic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocate the next connection id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value, for logging and diagnostics only.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State for one accepted connection.
///
/// `recv_buffer.len()` is the buffer capacity in the adaptive-sizing sense:
/// it starts at the configured default, grows to fit any larger message
/// body, and shrinks back toward the running average in
/// [`reset_after_message`](Self::reset_after_message). It never drops below
/// the configured default.
#[derive(Debug)]
pub struct ConnContext {
    /// Registry key for this connection
    pub id: ConnId,

    /// Peer address, for logging
    pub peer: SocketAddr,

    /// Owned receive buffer; message bodies are read into its prefix
    pub recv_buffer: Vec<u8>,

    /// Exponentially weighted moving average of message body sizes
    avg_recv_len: usize,

    /// Body size of the most recently received message
    pub last_body_len: usize,

    /// True until the initial handshake exchange completes
    pub awaiting_handshake: bool,
}

impl ConnContext {
    /// Allocate a context for a newly accepted connection.
    pub fn allocate(peer: SocketAddr, buffers: &BufferConfig, handshake_required: bool) -> Self {
        Self {
            id: ConnId::next(),
            peer,
            recv_buffer: vec![0; buffers.default_recv_buffer],
            avg_recv_len: buffers.default_recv_buffer,
            last_body_len: 0,
            awaiting_handshake: handshake_required,
        }
    }

    /// Current receive buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.recv_buffer.len()
    }

    /// Current running average of message body sizes.
    pub fn avg_recv_len(&self) -> usize {
        self.avg_recv_len
    }

    /// Grow the receive buffer to hold a body of `body_len` bytes.
    ///
    /// Capacity only ever grows here; shrinking happens exclusively in
    /// [`reset_after_message`](Self::reset_after_message).
    pub fn ensure_capacity(&mut self, body_len: usize) {
        if body_len > self.recv_buffer.len() {
            self.recv_buffer.resize(body_len, 0);
        }
    }

    /// The most recently received message body.
    ///
    /// Valid until the next receive cycle or reset overwrites the buffer.
    pub fn pending_message(&self) -> &[u8] {
        &self.recv_buffer[..self.last_body_len]
    }

    /// Fold the last message body size into the running average and shrink
    /// the buffer if the connection has settled into smaller messages.
    ///
    /// Called once the message body has been fully consumed by the response
    /// path. The average is clamped to the configured default so capacity
    /// never falls below it. A shrink trades possible future regrowth
    /// against reclaiming memory now, and reallocates rather than truncates
    /// so the freed pages actually return to the allocator.
    pub fn reset_after_message(&mut self, buffers: &BufferConfig) {
        let avg = self.avg_recv_len as f64 * buffers.avg_weight_prev
            + self.last_body_len as f64 * buffers.avg_weight_sample;
        self.avg_recv_len = (avg as usize).max(buffers.default_recv_buffer);

        if (self.avg_recv_len as f64) < self.recv_buffer.len() as f64 / buffers.shrink_ratio {
            self.recv_buffer = vec![0; self.avg_recv_len];
        }
    }
}
