//! # Core Wire Format
//!
//! Low-level message framing over byte streams.
//!
//! ## Wire Format
//! ```text
//! [Length(4, little-endian u32)] [Body(N)]
//! ```
//!
//! No delimiter, checksum, or version byte is defined at this layer; any
//! such concern belongs to the application above the message body.
//!
//! ## Security
//! - Length validation before allocation (default cap 16MB)

pub mod frame;
