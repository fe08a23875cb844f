//! # Utility Modules
//!
//! Supporting utilities shared across the engine.
//!
//! ## Components
//! - **Logging**: Structured logging configuration

pub mod logging;
