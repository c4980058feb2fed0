//! Checksum providers for the OB20 envelope.
//!
//! Header checksums are CRC-16 over a fixed byte range; payload tails are
//! CRC-32C (Castagnoli), computed incrementally as payload bytes stream in
//! and reset at frame boundaries.
//!
//! A stored checksum of exactly 0 is the protocol's "checksumming disabled"
//! sentinel. Verification is skipped entirely in that case; the engine never
//! computes a checksum just to compare it against 0.

use crc::{CRC_16_XMODEM, CRC_32_ISCSI, Crc, Digest};

use obwire_core::{ChecksumKind, Error, Result};

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// One-shot CRC-16 over a byte range.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// Verify a stored CRC-16 against the given bytes.
///
/// A stored value of 0 means checksumming is disabled and the check is
/// skipped.
pub fn verify_crc16(stored: u16, bytes: &[u8]) -> Result<()> {
    if stored == 0 {
        return Ok(());
    }
    let actual = crc16(bytes);
    if actual != stored {
        return Err(Error::ChecksumMismatch {
            kind: ChecksumKind::Header,
            expected: u32::from(stored),
            actual: u32::from(actual),
        });
    }
    Ok(())
}

/// Incremental CRC-32C (Castagnoli) accumulator.
pub struct Crc32c {
    digest: Digest<'static, u32>,
}

impl Crc32c {
    /// Create a fresh accumulator.
    pub fn new() -> Self {
        Self {
            digest: CRC32C.digest(),
        }
    }

    /// Discard any accumulated state.
    pub fn reset(&mut self) {
        self.digest = CRC32C.digest();
    }

    /// Feed bytes into the running checksum.
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Finalize the running checksum and reset the accumulator for the next
    /// frame.
    pub fn value(&mut self) -> u32 {
        std::mem::replace(&mut self.digest, CRC32C.digest()).finalize()
    }

    /// Verify a stored tail checksum against the accumulated payload bytes.
    ///
    /// A stored value of 0 means checksumming is disabled; the accumulator
    /// is reset without being compared.
    pub fn verify(&mut self, stored: u32) -> Result<()> {
        if stored == 0 {
            self.reset();
            return Ok(());
        }
        let actual = self.value();
        if actual != stored {
            return Err(Error::ChecksumMismatch {
                kind: ChecksumKind::Payload,
                expected: stored,
                actual,
            });
        }
        Ok(())
    }
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32c {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32c").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_known_vector() {
        // CRC-16/XMODEM check value for "123456789"
        assert_eq!(crc16(b"123456789"), 0x31C3);
        assert_eq!(crc16(b""), 0x0000);
    }

    #[test]
    fn test_crc32c_known_vector() {
        // CRC-32C (iSCSI) check value for "123456789"
        let mut crc = Crc32c::new();
        crc.update(b"123456789");
        assert_eq!(crc.value(), 0xE306_9283);
    }

    #[test]
    fn test_crc32c_incremental_matches_oneshot() {
        let mut whole = Crc32c::new();
        whole.update(b"hello world");

        let mut parts = Crc32c::new();
        parts.update(b"hello");
        parts.update(b" ");
        parts.update(b"world");

        assert_eq!(whole.value(), parts.value());
    }

    #[test]
    fn test_value_resets_accumulator() {
        let mut crc = Crc32c::new();
        crc.update(b"first frame");
        let first = crc.value();

        crc.update(b"first frame");
        assert_eq!(crc.value(), first);
    }

    #[test]
    fn test_stored_zero_skips_verification() {
        // Corrupted bytes, but a stored checksum of 0 must not be flagged.
        assert!(verify_crc16(0, b"anything at all").is_ok());

        let mut crc = Crc32c::new();
        crc.update(b"corrupted payload");
        assert!(crc.verify(0).is_ok());
        // And the accumulator was reset for the next frame.
        crc.update(b"123456789");
        assert_eq!(crc.value(), 0xE306_9283);
    }

    #[test]
    fn test_mismatch_reports_both_values() {
        let err = verify_crc16(0x1234, b"123456789").unwrap_err();
        match err {
            Error::ChecksumMismatch {
                kind,
                expected,
                actual,
            } => {
                assert_eq!(kind, ChecksumKind::Header);
                assert_eq!(expected, 0x1234);
                assert_eq!(actual, 0x31C3);
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }
}
