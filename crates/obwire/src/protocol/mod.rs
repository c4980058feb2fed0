//! Wire protocol framing definitions.
//!
//! Three nested framings share these types:
//!
//! - standard MySQL packets: 3-byte payload length + 1-byte sequence number,
//!   payloads over 16MB - 1 split across frames
//! - the compressed envelope: 7-byte header, body optionally deflated
//! - the OB20 envelope: a compressed-style 7-byte prefix, a 24-byte
//!   extensible header, an optional TLV extra-info block, the embedded
//!   standard packet bytes, and a CRC-32C tail

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Maximum payload size for a single standard packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Size of the standard 4-byte packet header.
pub const STANDARD_HEADER_SIZE: usize = 4;

/// Size of the compressed envelope header.
pub const COMPRESSED_HEADER_SIZE: usize = 7;

/// Size of the OB20 header proper, excluding the 7-byte compressed-style
/// prefix that precedes it on the wire.
pub const OB20_HEADER_SIZE: usize = 24;

/// Total bytes preceding the payload of an OB20 frame.
pub const OB20_FULL_HEADER_SIZE: usize = COMPRESSED_HEADER_SIZE + OB20_HEADER_SIZE;

/// Size of the CRC-32C tail closing every OB20 frame.
pub const OB20_TAIL_SIZE: usize = 4;

/// Magic constant identifying an OB20 header.
pub const OB20_MAGIC: u16 = 0x20AB;

/// Protocol version carried in every OB20 header.
pub const OB20_VERSION: u16 = 20;

/// Largest payload one OB20 frame can carry. The 24-bit compress length
/// field counts the 24-byte header, the payload and the 4-byte tail.
pub const OB20_MAX_PAYLOAD: usize = MAX_PACKET_SIZE - OB20_HEADER_SIZE - OB20_TAIL_SIZE;

/// Request ids are 24-bit and wrap.
pub const REQUEST_ID_MODULO: u32 = 0x0100_0000;

/// Inbound request id accepted while the connection's current request id
/// is 0, before the first request has been issued.
pub const PRE_FIRST_REQUEST_ID: u32 = 0x00FF_FFFF;

/// Packets shorter than this are never worth deflating.
pub const MIN_COMPRESS_LENGTH: usize = 50;

/// OB20 header flag bits.
pub mod ob20_flags {
    /// The first chunk of this request carries an extra-info block.
    pub const EXTRA_INFO_EXIST: u32 = 0x1;
    /// This is the final chunk of the request.
    pub const IS_LAST_PACKET: u32 = 0x2;
    /// The frame was rerouted by a proxy.
    pub const IS_PROXY_REROUTE: u32 = 0x4;
    /// The extra-info block uses the new byte-map serialization.
    pub const IS_NEW_EXTRA_INFO: u32 = 0x8;
}

/// A standard packet header.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Total header size in bytes.
    pub const SIZE: usize = STANDARD_HEADER_SIZE;

    /// Parse a packet header from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        let payload_length =
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
        let sequence_id = bytes[3];
        Self {
            payload_length,
            sequence_id,
        }
    }

    /// Encode the header to 4 bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// Header of one compressed envelope frame.
///
/// An `uncompressed_length` of 0 means the body is stored raw; otherwise the
/// body must inflate to exactly that many bytes.
#[derive(Debug, Clone, Copy)]
pub struct CompressedHeader {
    /// Number of body bytes following the header
    pub compressed_length: u32,
    /// Compressed-frame sequence number (wraps at 255)
    pub sequence_id: u8,
    /// Size of the body after inflation, or 0 when stored raw
    pub uncompressed_length: u32,
}

impl CompressedHeader {
    /// Total header size in bytes.
    pub const SIZE: usize = COMPRESSED_HEADER_SIZE;

    /// Parse a compressed header from 7 bytes.
    pub fn from_bytes(bytes: &[u8; 7]) -> Self {
        let compressed_length =
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
        let sequence_id = bytes[3];
        let uncompressed_length =
            u32::from(bytes[4]) | (u32::from(bytes[5]) << 8) | (u32::from(bytes[6]) << 16);
        Self {
            compressed_length,
            sequence_id,
            uncompressed_length,
        }
    }

    /// Encode the header to 7 bytes.
    pub fn to_bytes(&self) -> [u8; 7] {
        [
            (self.compressed_length & 0xFF) as u8,
            ((self.compressed_length >> 8) & 0xFF) as u8,
            ((self.compressed_length >> 16) & 0xFF) as u8,
            self.sequence_id,
            (self.uncompressed_length & 0xFF) as u8,
            ((self.uncompressed_length >> 8) & 0xFF) as u8,
            ((self.uncompressed_length >> 16) & 0xFF) as u8,
        ]
    }
}

/// Complete OB20 frame header as it appears on the wire: the 7-byte
/// compressed-style prefix followed by the 24-byte OB20 header proper.
///
/// `compress_length` always equals 24 + `payload_length` + 4, and
/// `uncompress_length` is always 0: OB20 never nests the zlib scheme.
#[derive(Debug, Clone, Copy)]
pub struct Ob20Header {
    /// Bytes following the 7-byte prefix: header + payload + tail
    pub compress_length: u32,
    /// Mirror of `ob_seq` in the prefix position
    pub compress_seq: u8,
    /// Always 0 for OB20 frames
    pub uncompress_length: u32,
    /// Magic constant, [`OB20_MAGIC`]
    pub magic: u16,
    /// Protocol version, [`OB20_VERSION`]
    pub version: u16,
    /// Identity of the connection this frame belongs to
    pub connection_id: u32,
    /// 24-bit id of the logical request, monotonic and wrapping
    pub request_id: u32,
    /// Per-request frame counter, reset at request start, wraps at 255
    pub ob_seq: u8,
    /// Number of payload bytes between header and tail
    pub payload_length: u32,
    /// Bitmask of [`ob20_flags`]
    pub flags: u32,
    /// Reserved, written as 0
    pub reserved: u16,
    /// CRC-16 over the 22 header bytes from `magic` through `reserved`,
    /// or 0 when checksumming is disabled
    pub header_checksum: u16,
}

impl Ob20Header {
    /// Total wire size of the header, prefix included.
    pub const SIZE: usize = OB20_FULL_HEADER_SIZE;

    /// Byte range of the serialized header covered by the CRC-16.
    pub const CHECKSUM_RANGE: std::ops::Range<usize> = COMPRESSED_HEADER_SIZE..Self::SIZE - 2;

    /// Build a header for an outbound chunk. The checksum field is left 0;
    /// the writer fills it in after serialization when checksums are on.
    pub fn for_chunk(
        connection_id: u32,
        request_id: u32,
        ob_seq: u8,
        payload_length: u32,
        flags: u32,
    ) -> Self {
        Self {
            compress_length: (OB20_HEADER_SIZE + OB20_TAIL_SIZE) as u32 + payload_length,
            compress_seq: ob_seq,
            uncompress_length: 0,
            magic: OB20_MAGIC,
            version: OB20_VERSION,
            connection_id,
            request_id,
            ob_seq,
            payload_length,
            flags,
            reserved: 0,
            header_checksum: 0,
        }
    }

    /// Parse a header from its 31 wire bytes.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut r = PacketReader::new(bytes);
        // The reads below cannot fail: the slice is exactly SIZE bytes.
        Self {
            compress_length: r.read_u24_le().unwrap_or(0),
            compress_seq: r.read_u8().unwrap_or(0),
            uncompress_length: r.read_u24_le().unwrap_or(0),
            magic: r.read_u16_le().unwrap_or(0),
            version: r.read_u16_le().unwrap_or(0),
            connection_id: r.read_u32_le().unwrap_or(0),
            request_id: r.read_u24_le().unwrap_or(0),
            ob_seq: r.read_u8().unwrap_or(0),
            payload_length: r.read_u32_le().unwrap_or(0),
            flags: r.read_u32_le().unwrap_or(0),
            reserved: r.read_u16_le().unwrap_or(0),
            header_checksum: r.read_u16_le().unwrap_or(0),
        }
    }

    /// Encode the header to its 31 wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut w = PacketWriter::with_capacity(Self::SIZE);
        w.write_u24_le(self.compress_length);
        w.write_u8(self.compress_seq);
        w.write_u24_le(self.uncompress_length);
        w.write_u16_le(self.magic);
        w.write_u16_le(self.version);
        w.write_u32_le(self.connection_id);
        w.write_u24_le(self.request_id);
        w.write_u8(self.ob_seq);
        w.write_u32_le(self.payload_length);
        w.write_u32_le(self.flags);
        w.write_u16_le(self.reserved);
        w.write_u16_le(self.header_checksum);
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(w.as_bytes());
        bytes
    }

    /// Is this the final chunk of its request?
    pub fn is_last(&self) -> bool {
        self.flags & ob20_flags::IS_LAST_PACKET != 0
    }

    /// Does this chunk carry an extra-info block?
    pub fn has_extra_info(&self) -> bool {
        self.flags & ob20_flags::EXTRA_INFO_EXIST != 0
    }
}
