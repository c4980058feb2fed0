//! Wire packet engine for the OceanBase MySQL-compatible protocol.
//!
//! This crate implements the three nested framings a client speaks on one
//! socket, behind a single engine facade. It provides:
//!
//! - Standard MySQL packet framing with sequence numbers and 16MB splitting
//! - The zlib compressed envelope with the 50-byte threshold heuristic
//! - The OB20 envelope: extensible headers, CRC-16/CRC-32C checksums,
//!   request identity validation and extra-info multiplexing
//! - Varint/TLV and length-encoded primitives for the layers above
//! - An output buffer manager for command assembly
//!
//! # Protocol Overview
//!
//! Every byte on the wire is part of a standard packet: 3-byte payload
//! length + 1-byte sequence number, payloads over 16MB - 1 split across
//! frames. Depending on negotiated capabilities those packets travel bare,
//! inside compressed envelope frames, or embedded in OB20 frames that add
//! connection/request identity, checksums, and a TLV metadata sidecar.
//!
//! # Example
//!
//! ```rust,ignore
//! use obwire::{EngineConfig, EnvelopeMode, PacketEngine};
//!
//! let config = EngineConfig::new()
//!     .mode(EnvelopeMode::Ob20)
//!     .connection_id(conn_id);
//!
//! let mut engine = PacketEngine::new(socket, &config);
//! engine.send(b"\x03SELECT 1", None)?;
//! let reply = engine.receive()?;
//! ```

pub mod buffer;
pub mod checksum;
pub mod compress;
pub mod config;
pub mod engine;
pub mod extra_info;
pub mod framer;
pub mod ob20;
pub mod protocol;
pub mod trace;

pub use buffer::CommandBuffer;
pub use config::{EngineConfig, EnvelopeMode};
pub use engine::{LogicalPacket, PacketEngine};
pub use extra_info::{ExtraInfo, ExtraInfoEntry};
pub use obwire_core::{ChecksumKind, Error, Result};
pub use trace::{Direction, HexDumpSink, TraceSink};
