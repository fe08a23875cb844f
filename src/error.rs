//! # Error Types
//!
//! Error handling for the server engine.
//!
//! This module defines all error variants that can occur while running the
//! engine, from startup failures to per-connection I/O errors.
//!
//! ## Error Categories
//! - **Startup Errors**: bind, listen, and reactor initialization failures;
//!   fatal to `start()`, reported to the caller after partial resources are
//!   released.
//! - **Connection Errors**: disconnects, read/write failures, oversized or
//!   malformed frames; scoped to a single connection, which is closed.
//! - **Invariant Violations**: duplicate registry entries, lifecycle misuse.
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common cases.
pub mod constants {
    /// Registry lock errors
    pub const ERR_REGISTRY_LOCK: &str = "Failed to acquire connection registry lock";

    /// Connection errors
    pub const ERR_PEER_DISCONNECTED: &str = "Peer disconnected";
    pub const ERR_HANDSHAKE_MISMATCH: &str = "Handshake token mismatch";
    pub const ERR_HANDSHAKE_EOF: &str = "Connection closed during handshake";

    /// Lifecycle errors
    pub const ERR_NOT_LISTENING: &str = "Server is not listening";
    pub const ERR_ALREADY_LISTENING: &str = "Server is already listening";
}

/// EngineError is the primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to bind listening socket: {0}")]
    Bind(#[source] io::Error),

    #[error("Failed to listen on bound socket: {0}")]
    Listen(#[source] io::Error),

    #[error("Failed to initialize readiness monitor: {0}")]
    MonitorInit(#[source] io::Error),

    #[error("Failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("Peer disconnected")]
    PeerDisconnected,

    #[error("Read error: {0}")]
    Read(#[source] io::Error),

    #[error("Write error: {0}")]
    Write(#[source] io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Message too large: {0} bytes")]
    OversizedMessage(usize),

    #[error("Duplicate descriptor in connection registry: {0}")]
    DuplicateDescriptor(u64),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server is not listening")]
    NotListening,

    #[error("Server is already listening")]
    AlreadyListening,
}

impl EngineError {
    /// Whether this error is scoped to a single connection.
    ///
    /// Connection-scoped errors close the affected connection and are never
    /// propagated beyond it; anything else is surfaced to the caller.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            Self::PeerDisconnected
                | Self::Read(_)
                | Self::Write(_)
                | Self::Handshake(_)
                | Self::OversizedMessage(_)
        )
    }
}

/// Type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
