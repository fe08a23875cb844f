//! Application message dispatch.
//!
//! Once the receive pipeline has a complete message body, it hands the bytes
//! to a [`Dispatch`] implementation and transmits whatever it returns. The
//! engine never interprets payloads; routing, decoding, and business logic
//! all live behind this trait.
//!
//! Dispatch runs synchronously on the worker driving the connection, so the
//! connection reads no further messages until the handler returns. Handlers
//! that need real concurrency should hand work to their own executor and
//! reply when done.

use crate::conn::context::ConnId;
use crate::error::Result;
use bytes::Bytes;

/// Application seam invoked with each fully received message body.
pub trait Dispatch: Send + Sync + 'static {
    /// Produce the response body for a received message.
    ///
    /// An `Err` closes the connection; connection-scoped errors never
    /// propagate beyond it.
    fn dispatch(&self, conn: ConnId, body: &[u8]) -> Result<Bytes>;
}

/// Echoes every message body back unchanged. Useful for tests and wire-level
/// diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Dispatch for Echo {
    fn dispatch(&self, _conn: ConnId, body: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(body))
    }
}

/// Adapter turning a closure into a [`Dispatch`] implementation.
pub struct FnDispatch<F>(F);

impl<F> FnDispatch<F>
where
    F: Fn(ConnId, &[u8]) -> Result<Bytes> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Dispatch for FnDispatch<F>
where
    F: Fn(ConnId, &[u8]) -> Result<Bytes> + Send + Sync + 'static,
{
    fn dispatch(&self, conn: ConnId, body: &[u8]) -> Result<Bytes> {
        (self.0)(conn, body)
    }
}
