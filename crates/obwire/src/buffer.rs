//! Output buffer for command assembly.
//!
//! Commands are built up in memory before framing. The buffer grows through
//! a fixed capacity ladder instead of doubling, and shrinks back after a
//! command that used much less than the allocation, so one oversized bulk
//! insert does not pin 16MB for the life of the connection.
//!
//! Commands larger than the frame limit are sent in parts: the caller marks
//! a frame boundary, keeps writing, and `flush_to_mark` hands back the
//! marked prefix while sliding the overflow to the front for the next frame.

#![allow(clippy::cast_possible_truncation)]

use obwire_core::{Error, Result};

/// Initial buffer capacity.
pub const SMALL_BUFFER_SIZE: usize = 8 * 1024;
/// Second rung of the capacity ladder.
pub const MEDIUM_BUFFER_SIZE: usize = 128 * 1024;
/// Third rung.
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;
/// Top rung, the largest frame the protocol can carry plus headroom.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const LADDER: [usize; 4] = [
    SMALL_BUFFER_SIZE,
    MEDIUM_BUFFER_SIZE,
    LARGE_BUFFER_SIZE,
    MAX_BUFFER_SIZE,
];

fn rung_for(needed: usize) -> usize {
    LADDER
        .iter()
        .copied()
        .find(|&rung| rung >= needed)
        .unwrap_or(needed)
}

/// Growable command assembly buffer with mark/flush support.
#[derive(Debug)]
pub struct CommandBuffer {
    buf: Vec<u8>,
    mark: Option<usize>,
    flushed: usize,
    peak: usize,
}

impl CommandBuffer {
    /// Create a buffer at the smallest ladder capacity.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(SMALL_BUFFER_SIZE),
            mark: None,
            flushed: 0,
            peak: 0,
        }
    }

    /// Bytes written and not yet flushed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Is the unflushed region empty?
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current allocation size.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Bytes already flushed for the command being assembled.
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    /// The unflushed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed > self.buf.capacity() {
            self.buf.reserve_exact(rung_for(needed) - self.buf.len());
        }
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.grow_for(1);
        self.buf.push(value);
    }

    /// Append a u16, little-endian.
    pub fn write_u16_le(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append the low 3 bytes of a u32, little-endian.
    pub fn write_u24_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes()[..3]);
    }

    /// Append a u32, little-endian.
    pub fn write_u32_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a u64, little-endian.
    pub fn write_u64_le(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.grow_for(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Append a string's bytes.
    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Append bytes escaped for use inside a single-quoted string literal.
    ///
    /// With `no_backslash_escapes` the server treats backslash as a plain
    /// character, so only the quote itself needs doubling; otherwise quote,
    /// double quote, backslash and NUL get a backslash escape.
    pub fn write_bytes_escaped(&mut self, data: &[u8], no_backslash_escapes: bool) {
        // Worst case doubles the input.
        self.grow_for(data.len() * 2);
        if no_backslash_escapes {
            for &b in data {
                if b == b'\'' {
                    self.buf.push(b'\'');
                }
                self.buf.push(b);
            }
        } else {
            for &b in data {
                match b {
                    0 => {
                        self.buf.push(b'\\');
                        self.buf.push(b'0');
                    }
                    b'\'' | b'"' | b'\\' => {
                        self.buf.push(b'\\');
                        self.buf.push(b);
                    }
                    _ => self.buf.push(b),
                }
            }
        }
    }

    /// Record the current position as a frame boundary.
    pub fn mark(&mut self) {
        self.mark = Some(self.buf.len());
    }

    /// Position of the last mark, if one is set.
    pub fn marked(&self) -> Option<usize> {
        self.mark
    }

    /// Split off everything up to the last mark as the frame to send.
    ///
    /// Bytes written after the mark slide to the front of the buffer and
    /// stay pending. Without a mark the whole buffer is taken.
    pub fn flush_to_mark(&mut self) -> Vec<u8> {
        let mark = self.mark.take().unwrap_or(self.buf.len());
        self.peak = self.peak.max(self.buf.len());
        let frame = self.buf[..mark].to_vec();
        self.buf.copy_within(mark.., 0);
        self.buf.truncate(self.buf.len() - mark);
        self.flushed += mark;
        frame
    }

    /// Enforce the configured command size limit.
    ///
    /// Before anything has been flushed the command can simply be abandoned,
    /// so the overflow is the recoverable `CommandTooLarge`. Once part of
    /// the command is on the wire the stream carries a torn command and the
    /// connection is unusable: `MaxAllowedPacketExceeded`.
    pub fn check_limit(&self, max: usize) -> Result<()> {
        let length = self.flushed + self.buf.len();
        if length <= max {
            return Ok(());
        }
        if self.flushed == 0 {
            Err(Error::CommandTooLarge { length, max })
        } else {
            Err(Error::MaxAllowedPacketExceeded { length, max })
        }
    }

    /// Reset for the next command, dropping back to the smallest rung when
    /// the finished command used less than half the allocation.
    pub fn finish_command(&mut self) {
        let used = self.peak.max(self.buf.len());
        self.buf.clear();
        self.mark = None;
        self.flushed = 0;
        self.peak = 0;
        let capacity = self.buf.capacity();
        if capacity > SMALL_BUFFER_SIZE && used < capacity / 2 {
            self.buf = Vec::with_capacity(SMALL_BUFFER_SIZE);
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_growth() {
        let mut buf = CommandBuffer::new();
        assert_eq!(buf.capacity(), SMALL_BUFFER_SIZE);

        buf.write_bytes(&vec![0u8; SMALL_BUFFER_SIZE + 1]);
        assert_eq!(buf.capacity(), MEDIUM_BUFFER_SIZE);

        buf.write_bytes(&vec![0u8; MEDIUM_BUFFER_SIZE]);
        assert_eq!(buf.capacity(), LARGE_BUFFER_SIZE);

        buf.write_bytes(&vec![0u8; LARGE_BUFFER_SIZE]);
        assert_eq!(buf.capacity(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn test_shrinks_after_small_command() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(&vec![0u8; LARGE_BUFFER_SIZE + 1]);
        assert_eq!(buf.capacity(), MAX_BUFFER_SIZE);

        // Used less than half the 16MiB allocation: back to the bottom
        // rung, not an intermediate one.
        buf.finish_command();
        assert_eq!(buf.capacity(), SMALL_BUFFER_SIZE);
    }

    #[test]
    fn test_keeps_capacity_after_large_command() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(&vec![0u8; MEDIUM_BUFFER_SIZE - 1]);
        buf.finish_command();
        // Used more than half of the medium allocation: keep it.
        assert_eq!(buf.capacity(), MEDIUM_BUFFER_SIZE);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_mark_and_flush_relocates_tail() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(b"frame one bytes");
        buf.mark();
        buf.write_bytes(b"overflow");

        let frame = buf.flush_to_mark();
        assert_eq!(frame, b"frame one bytes");
        assert_eq!(buf.as_bytes(), b"overflow");
        assert_eq!(buf.flushed(), frame.len());
        assert!(buf.marked().is_none());
    }

    #[test]
    fn test_flush_without_mark_takes_everything() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(b"whole command");
        let frame = buf.flush_to_mark();
        assert_eq!(frame, b"whole command");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_limit_before_flush_is_recoverable() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(&[0u8; 100]);
        let err = buf.check_limit(64).unwrap_err();
        assert!(matches!(err, Error::CommandTooLarge { length: 100, max: 64 }));
        assert!(!err.is_fatal());

        // Abandoning the command recovers.
        buf.finish_command();
        assert!(buf.check_limit(64).is_ok());
    }

    #[test]
    fn test_limit_after_partial_flush_is_fatal() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes(&[0u8; 60]);
        buf.mark();
        buf.write_bytes(&[0u8; 60]);
        let _ = buf.flush_to_mark();

        let err = buf.check_limit(64).unwrap_err();
        assert!(matches!(
            err,
            Error::MaxAllowedPacketExceeded { length: 120, max: 64 }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_escaping_backslash_mode() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes_escaped(b"it's a \"test\"\\\x00", false);
        assert_eq!(buf.as_bytes(), b"it\\'s a \\\"test\\\"\\\\\\0");
    }

    #[test]
    fn test_escaping_no_backslash_mode() {
        let mut buf = CommandBuffer::new();
        buf.write_bytes_escaped(b"it's \\plain", true);
        assert_eq!(buf.as_bytes(), b"it''s \\plain");
    }

    #[test]
    fn test_numeric_writers() {
        let mut buf = CommandBuffer::new();
        buf.write_u8(0x01);
        buf.write_u16_le(0x0302);
        buf.write_u24_le(0x0605_04);
        buf.write_u32_le(0x0A09_0807);
        assert_eq!(
            buf.as_bytes(),
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]
        );
    }
}
