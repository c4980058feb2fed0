//! Extra-info sidecar metadata.
//!
//! Trace and session state ride alongside the embedded standard packet in
//! an OB20 frame as a block of TLV records. Two serializations exist for
//! the same logical data, selected by a connection-negotiated flag that is
//! also reflected in `IS_NEW_EXTRA_INFO` on the wire:
//!
//! - legacy: each record's value is wrapped as a varint-length-prefixed,
//!   NUL-terminated byte string inside the TLV value
//! - new: each record's value is the raw TLV value bytes
//!
//! The engine itself treats the block as opaque; this module is for the
//! trace/session providers on either side of it. Records with unknown keys
//! are preserved as raw entries rather than dropped, so round-tripping a
//! block never loses data.

use obwire_core::{Error, Result};

use crate::protocol::{PacketReader, PacketWriter};

/// Well-known extra-info record keys.
pub mod keys {
    /// Proxy trace info (ip/port path of the request)
    pub const TRACE_INFO: u16 = 1;
    /// Session state synchronization payload
    pub const SESS_INFO: u16 = 2;
    /// Full-link trace span context
    pub const FULL_TRC: u16 = 3;
}

/// One extra-info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraInfoEntry {
    /// Record key; see [`keys`] for the well-known ones
    pub key: u16,
    /// Record value, opaque to the engine
    pub value: Vec<u8>,
}

/// An ordered set of extra-info records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraInfo {
    /// Records in wire order
    pub entries: Vec<ExtraInfoEntry>,
}

impl ExtraInfo {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Is there anything to send?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a record.
    pub fn push(&mut self, key: u16, value: impl Into<Vec<u8>>) {
        self.entries.push(ExtraInfoEntry {
            key,
            value: value.into(),
        });
    }

    /// Serialize the block.
    ///
    /// `new_format` selects the byte-map serialization; otherwise values are
    /// wrapped in the legacy varint-string encoding.
    pub fn encode(&self, new_format: bool) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        for entry in &self.entries {
            if new_format {
                writer.write_tlv(entry.key, &entry.value);
            } else {
                let mut inner = PacketWriter::with_capacity(entry.value.len() + 11);
                inner.write_var_bytes(&entry.value);
                writer.write_tlv(entry.key, inner.as_bytes());
            }
        }
        writer.into_bytes()
    }

    /// Parse a block serialized by [`ExtraInfo::encode`] or a peer.
    ///
    /// Records with unknown keys are kept; a record whose value cannot be
    /// framed is `TruncatedInput`.
    pub fn decode(bytes: &[u8], new_format: bool) -> Result<Self> {
        let mut reader = PacketReader::new(bytes);
        let mut entries = Vec::new();
        while !reader.is_empty() {
            let (key, raw) = reader.read_tlv().ok_or(Error::TruncatedInput {
                context: "extra-info record",
            })?;
            let value = if new_format {
                raw.to_vec()
            } else {
                let mut inner = PacketReader::new(raw);
                let value = inner.read_var_bytes().ok_or(Error::TruncatedInput {
                    context: "extra-info varint string",
                })?;
                if !inner.is_empty() {
                    return Err(Error::TruncatedInput {
                        context: "extra-info varint string",
                    });
                }
                value
            };
            entries.push(ExtraInfoEntry { key, value });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtraInfo {
        let mut info = ExtraInfo::new();
        info.push(keys::TRACE_INFO, b"client=10.0.0.1:4242".as_slice());
        info.push(keys::SESS_INFO, b"autocommit=1".as_slice());
        info
    }

    #[test]
    fn test_roundtrip_both_formats() {
        let info = sample();
        for new_format in [false, true] {
            let bytes = info.encode(new_format);
            let decoded = ExtraInfo::decode(&bytes, new_format).unwrap();
            assert_eq!(decoded, info);
        }
    }

    #[test]
    fn test_new_format_layout() {
        let mut info = ExtraInfo::new();
        info.push(keys::FULL_TRC, b"ab".as_slice());
        let bytes = info.encode(true);
        assert_eq!(bytes, [0x03, 0x00, 0x02, 0x00, 0x00, 0x00, b'a', b'b']);
    }

    #[test]
    fn test_legacy_format_wraps_varint_string() {
        let mut info = ExtraInfo::new();
        info.push(keys::TRACE_INFO, b"ab".as_slice());
        let bytes = info.encode(false);
        // TLV value is: varint len 2, "ab", NUL.
        assert_eq!(
            bytes,
            [0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, b'a', b'b', 0x00]
        );
    }

    #[test]
    fn test_unknown_keys_survive() {
        let mut info = ExtraInfo::new();
        info.push(0x7FFF, b"future".as_slice());
        info.push(keys::SESS_INFO, b"x".as_slice());

        let bytes = info.encode(true);
        let decoded = ExtraInfo::decode(&bytes, true).unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.entries[0].key, 0x7FFF);
        assert_eq!(decoded.entries[0].value, b"future");
        assert_eq!(decoded.encode(true), bytes);
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = sample().encode(true);
        bytes.truncate(bytes.len() - 1);
        let err = ExtraInfo::decode(&bytes, true).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput { .. }));
    }

    #[test]
    fn test_empty_block() {
        let info = ExtraInfo::new();
        assert!(info.is_empty());
        assert!(info.encode(false).is_empty());
        assert!(ExtraInfo::decode(&[], true).unwrap().is_empty());
    }
}
