//! Wire data reading utilities.
//!
//! The inverse of [`super::writer::PacketWriter`]: little-endian integers,
//! MySQL length-encoded values, base-128 varints, NUL-terminated varint
//! strings, and TLV records. All reads return `None` when the buffer runs
//! out; callers translate that into `TruncatedInput` with their own context.

#![allow(clippy::cast_possible_truncation)]

/// A reader for wire protocol data.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Create a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get remaining bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if we've reached the end of the data.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek at the next byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos)?;
        self.pos += 1;
        Some(*byte)
    }

    /// Read a u16 (little-endian).
    pub fn read_u16_le(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let value = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Some(value)
    }

    /// Read a u24 (little-endian, 3 bytes).
    pub fn read_u24_le(&mut self) -> Option<u32> {
        if self.remaining() < 3 {
            return None;
        }
        let value = u32::from(self.data[self.pos])
            | (u32::from(self.data[self.pos + 1]) << 8)
            | (u32::from(self.data[self.pos + 2]) << 16);
        self.pos += 3;
        Some(value)
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_le(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let value = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Some(value)
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_le(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Some(u64::from_le_bytes(bytes))
    }

    /// Read a length-encoded integer.
    ///
    /// MySQL uses a variable-length integer encoding:
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFC: 2-byte value follows
    /// - 0xFD: 3-byte value follows
    /// - 0xFE: 8-byte value follows
    /// - 0xFB: NULL (special case for length-encoded strings)
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB => None, // NULL marker
            0xFF => None, // Reserved/error
        }
    }

    /// Read a length-encoded byte slice.
    pub fn read_lenenc_bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.read_lenenc_int()? as usize;
        self.read_bytes(len).map(<[u8]>::to_vec)
    }

    /// Read a null-terminated string.
    pub fn read_null_string(&mut self) -> Option<String> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos] != 0 {
            self.pos += 1;
        }
        let s = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        // Skip the null terminator
        if self.pos < self.data.len() {
            self.pos += 1;
        }
        Some(s)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(bytes)
    }

    /// Read remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Skip a number of bytes.
    pub fn skip(&mut self, n: usize) -> bool {
        if self.remaining() >= n {
            self.pos += n;
            true
        } else {
            false
        }
    }

    /// Read a base-128 varint.
    ///
    /// Returns `None` when the buffer ends before a terminator byte (one
    /// with the high bit clear) is seen.
    pub fn read_var_int(&mut self) -> Option<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
            shift += 7;
            if shift >= 70 {
                // More than 10 bytes cannot encode a u64.
                return None;
            }
        }
    }

    /// Read a varint-length-prefixed byte string and its trailing NUL.
    pub fn read_var_bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.read_var_int()? as usize;
        let bytes = self.read_bytes(len)?.to_vec();
        // Every varint string carries a trailing NUL, even when empty.
        self.read_u8()?;
        Some(bytes)
    }

    /// Read one TLV record: 2-byte type tag, 4-byte length, raw value.
    ///
    /// Unknown tags are the caller's business; the value bytes are always
    /// consumed in full, which is what lets decoders skip types they do not
    /// understand.
    pub fn read_tlv(&mut self) -> Option<(u16, &'a [u8])> {
        let tag = self.read_u16_le()?;
        let len = self.read_u32_le()? as usize;
        let value = self.read_bytes(len)?;
        Some((tag, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u8() {
        let mut reader = PacketReader::new(&[0x42, 0x43]);
        assert_eq!(reader.read_u8(), Some(0x42));
        assert_eq!(reader.read_u8(), Some(0x43));
        assert_eq!(reader.read_u8(), None);
    }

    #[test]
    fn test_read_u24_le() {
        let mut reader = PacketReader::new(&[0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u24_le(), Some(0x0012_3456));
    }

    #[test]
    fn test_read_lenenc_int() {
        let mut reader = PacketReader::new(&[0x42]);
        assert_eq!(reader.read_lenenc_int(), Some(0x42));

        let mut reader = PacketReader::new(&[0xFC, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int(), Some(0x1234));

        let mut reader = PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int(), Some(0x0012_3456));

        let mut reader = PacketReader::new(&[0xFE, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(reader.read_lenenc_int(), Some(0x0807_0605_0403_0201));
    }

    #[test]
    fn test_read_null_string() {
        let mut reader = PacketReader::new(b"hello\0world\0");
        assert_eq!(reader.read_null_string(), Some("hello".to_string()));
        assert_eq!(reader.read_null_string(), Some("world".to_string()));
    }

    #[test]
    fn test_read_var_int_roundtrip() {
        use super::super::writer::PacketWriter;

        for value in [0u64, 1, 127, 128, 300, 0xFFFF, u64::from(u32::MAX), u64::MAX] {
            let mut writer = PacketWriter::new();
            writer.write_var_int(value);
            let bytes = writer.into_bytes();
            let mut reader = PacketReader::new(&bytes);
            assert_eq!(reader.read_var_int(), Some(value));
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_read_var_int_truncated() {
        // Continuation bit set but the stream ends
        let mut reader = PacketReader::new(&[0x80]);
        assert_eq!(reader.read_var_int(), None);

        let mut reader = PacketReader::new(&[0xFF, 0xFF]);
        assert_eq!(reader.read_var_int(), None);
    }

    #[test]
    fn test_read_var_bytes_consumes_nul() {
        let mut reader = PacketReader::new(&[0x03, b'a', b'b', b'c', 0x00, 0x42]);
        assert_eq!(reader.read_var_bytes(), Some(b"abc".to_vec()));
        // The NUL was consumed; the next byte is application data.
        assert_eq!(reader.read_u8(), Some(0x42));
    }

    #[test]
    fn test_read_var_bytes_missing_nul() {
        let mut reader = PacketReader::new(&[0x03, b'a', b'b', b'c']);
        assert_eq!(reader.read_var_bytes(), None);
    }

    #[test]
    fn test_read_tlv() {
        let mut reader = PacketReader::new(&[0x02, 0x00, 0x02, 0x00, 0x00, 0x00, b'x', b'y']);
        assert_eq!(reader.read_tlv(), Some((0x0002u16, &b"xy"[..])));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_tlv_truncated_value() {
        let mut reader = PacketReader::new(&[0x02, 0x00, 0x05, 0x00, 0x00, 0x00, b'x']);
        assert_eq!(reader.read_tlv(), None);
    }
}
