//! # framelink
//!
//! Connection-oriented TCP server engine exchanging length-prefixed binary
//! messages, with per-connection receive buffers that adapt their size to
//! observed traffic.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   accept    ┌──────────────┐   readiness   ┌─────────────┐
//! │ Accept     │────────────▶│ Connection   │◀─────────────│ tokio       │
//! │ Task       │  register   │ Driver Tasks │    events     │ Reactor     │
//! └─────┬──────┘             └──────┬───────┘               └─────────────┘
//!       │ insert/remove             │ receive ─▶ dispatch ─▶ send ─▶ reset
//!       ▼                          ▼
//! ┌──────────────────────────────────────────┐
//! │ ConnRegistry (short-held mutex)          │
//! └──────────────────────────────────────────┘
//! ```
//!
//! A single accept task registers each new connection and hands it to a
//! driver task that owns its [`conn::ConnContext`] exclusively. The driver
//! reads one `[length][body]` frame at a time into the context's buffer,
//! hands the body to the application's [`protocol::Dispatch`]
//! implementation, writes the response, and then lets the buffer shrink
//! toward the running average of observed message sizes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framelink::{config::EngineConfig, protocol::Echo, service::Server};
//!
//! #[tokio::main]
//! async fn main() -> framelink::error::Result<()> {
//!     let mut server = Server::new(EngineConfig::default(), Echo);
//!     let addr = server.start(0).await?;
//!     println!("listening on {addr}");
//!     // ... serve traffic ...
//!     server.shutdown().await
//! }
//! ```
//!
//! ## Scope
//!
//! The engine does not interpret message payloads, does not implement TLS,
//! and provides no backpressure beyond the OS socket buffers. Per-message
//! timeouts are the caller's responsibility.

pub mod config;
pub mod conn;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::EngineConfig;
pub use conn::{ConnContext, ConnId, ConnRegistry};
pub use error::{EngineError, Result};
pub use protocol::{Dispatch, Echo, FnDispatch};
pub use service::{Client, Server, ServerState};

/// Version of framelink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
