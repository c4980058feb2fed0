//! Wire data writing utilities.
//!
//! Covers the MySQL-side primitives (little-endian integers, length-encoded
//! integers and strings) and the OB-side primitives (base-128 varints,
//! NUL-terminated varint strings, TLV records) used by the extra-info block.

#![allow(clippy::cast_possible_truncation)]

/// A writer for wire protocol data.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the buffer as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a u16 (little-endian).
    pub fn write_u16_le(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u24 (little-endian, 3 bytes).
    pub fn write_u24_le(&mut self, value: u32) {
        self.buffer.push((value & 0xFF) as u8);
        self.buffer.push(((value >> 8) & 0xFF) as u8);
        self.buffer.push(((value >> 16) & 0xFF) as u8);
    }

    /// Write a u32 (little-endian).
    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    pub fn write_u64_le(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-encoded integer.
    ///
    /// MySQL uses a variable-length integer encoding:
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFC + 2 bytes: values up to 2^16
    /// - 0xFD + 3 bytes: values up to 2^24
    /// - 0xFE + 8 bytes: values up to 2^64
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x10000 {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value < 0x0100_0000 {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Write a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_int(s.len() as u64);
        self.buffer.extend_from_slice(s.as_bytes());
    }

    /// Write a length-encoded byte slice.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buffer.extend_from_slice(data);
    }

    /// Write a null-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Write a fixed-length string, padding with zeros if necessary.
    pub fn write_fixed_string(&mut self, s: &str, len: usize) {
        let bytes = s.as_bytes();
        if bytes.len() >= len {
            self.buffer.extend_from_slice(&bytes[..len]);
        } else {
            self.buffer.extend_from_slice(bytes);
            self.buffer.resize(self.buffer.len() + len - bytes.len(), 0);
        }
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write zeros (padding).
    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Write a base-128 varint.
    ///
    /// Seven payload bits per byte, least-significant group first, with the
    /// high bit set on every byte except the terminator. Occupies 1 to 10
    /// bytes depending on the value.
    pub fn write_var_int(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }

    /// Write a varint-length-prefixed byte string followed by a single NUL.
    ///
    /// The trailing NUL is written even for empty values; decoders consume
    /// and discard it.
    pub fn write_var_bytes(&mut self, data: &[u8]) {
        self.write_var_int(data.len() as u64);
        self.buffer.extend_from_slice(data);
        self.buffer.push(0);
    }

    /// Write one TLV record: 2-byte type tag, 4-byte length, raw value.
    pub fn write_tlv(&mut self, tag: u16, value: &[u8]) {
        self.write_u16_le(tag);
        self.write_u32_le(value.len() as u32);
        self.buffer.extend_from_slice(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_u8() {
        let mut writer = PacketWriter::new();
        writer.write_u8(0x42);
        assert_eq!(writer.as_bytes(), &[0x42]);
    }

    #[test]
    fn test_write_u16_le() {
        let mut writer = PacketWriter::new();
        writer.write_u16_le(0x1234);
        assert_eq!(writer.as_bytes(), &[0x34, 0x12]);
    }

    #[test]
    fn test_write_u24_le() {
        let mut writer = PacketWriter::new();
        writer.write_u24_le(0x0012_3456);
        assert_eq!(writer.as_bytes(), &[0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_write_u32_le() {
        let mut writer = PacketWriter::new();
        writer.write_u32_le(0x1234_5678);
        assert_eq!(writer.as_bytes(), &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_write_lenenc_int() {
        // 1-byte value
        let mut writer = PacketWriter::new();
        writer.write_lenenc_int(0x42);
        assert_eq!(writer.as_bytes(), &[0x42]);

        // 2-byte value
        let mut writer = PacketWriter::new();
        writer.write_lenenc_int(0x1234);
        assert_eq!(writer.as_bytes(), &[0xFC, 0x34, 0x12]);

        // 3-byte value
        let mut writer = PacketWriter::new();
        writer.write_lenenc_int(0x0012_3456);
        assert_eq!(writer.as_bytes(), &[0xFD, 0x56, 0x34, 0x12]);

        // 8-byte value
        let mut writer = PacketWriter::new();
        writer.write_lenenc_int(0x0807_0605_0403_0201);
        assert_eq!(
            writer.as_bytes(),
            &[0xFE, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_write_null_string() {
        let mut writer = PacketWriter::new();
        writer.write_null_string("hello");
        assert_eq!(writer.as_bytes(), b"hello\0");
    }

    #[test]
    fn test_write_var_int() {
        // Single byte, high bit clear
        let mut writer = PacketWriter::new();
        writer.write_var_int(0x42);
        assert_eq!(writer.as_bytes(), &[0x42]);

        // Zero is one terminator byte
        let mut writer = PacketWriter::new();
        writer.write_var_int(0);
        assert_eq!(writer.as_bytes(), &[0x00]);

        // 300 = 0b10_0101100 -> 0xAC 0x02
        let mut writer = PacketWriter::new();
        writer.write_var_int(300);
        assert_eq!(writer.as_bytes(), &[0xAC, 0x02]);

        // u64::MAX occupies the full 10 bytes
        let mut writer = PacketWriter::new();
        writer.write_var_int(u64::MAX);
        assert_eq!(writer.len(), 10);
        assert_eq!(writer.as_bytes()[9], 0x01);
    }

    #[test]
    fn test_write_var_bytes_appends_nul() {
        let mut writer = PacketWriter::new();
        writer.write_var_bytes(b"abc");
        assert_eq!(writer.as_bytes(), &[0x03, b'a', b'b', b'c', 0x00]);

        // Empty values still get a length byte and a NUL
        let mut writer = PacketWriter::new();
        writer.write_var_bytes(b"");
        assert_eq!(writer.as_bytes(), &[0x00, 0x00]);
    }

    #[test]
    fn test_write_tlv() {
        let mut writer = PacketWriter::new();
        writer.write_tlv(0x0002, b"xy");
        assert_eq!(
            writer.as_bytes(),
            &[0x02, 0x00, 0x02, 0x00, 0x00, 0x00, b'x', b'y']
        );
    }
}
