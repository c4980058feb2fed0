//! Core types for the obwire packet engine.
//!
//! This crate holds the error surface shared by the wire-protocol codecs and
//! the layers that consume them. The engine never retries internally; every
//! fatal error here means the connection is broken and must be closed, and
//! retry/failover policy belongs to the caller.

pub mod error;

pub use error::{ChecksumKind, Error, Result};
