//! # Service Layer
//!
//! The server engine itself and a minimal framed client for talking to it.

pub mod client;
pub mod server;

pub use client::Client;
pub use server::{Server, ServerState};
