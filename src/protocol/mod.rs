//! # Protocol Layer
//!
//! The seams between the engine and the application: message dispatch and
//! the optional connection handshake.

pub mod dispatcher;
pub mod handshake;

pub use dispatcher::{Dispatch, Echo, FnDispatch};
