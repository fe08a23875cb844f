//! # Connection State
//!
//! Per-connection context objects and the registry that tracks them.
//!
//! A [`context::ConnContext`] is owned by exactly one driver task at a time;
//! the [`registry::ConnRegistry`] is the only structure shared across
//! threads, guarded by a short-held lock.

pub mod context;
pub mod registry;

pub use context::{ConnContext, ConnId};
pub use registry::{ConnHandle, ConnRegistry};
