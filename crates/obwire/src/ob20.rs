//! OB20 envelope: extensible headers, checksums, extra-info multiplexing,
//! large-payload splitting, and strict identity validation.
//!
//! A logical request is carried as one or more OB20 frames. Each frame is a
//! compressed-style 7-byte prefix, the 24-byte OB20 header, the payload
//! chunk, and a CRC-32C tail. The first chunk may lead with an extra-info
//! block (4-byte length prefix plus TLV bytes); the embedded standard-frame
//! bytes follow. Any header field that fails validation on read is a fatal
//! desync: the stream position can no longer be trusted and the connection
//! must be closed.

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};

use obwire_core::{Error, Result};

use crate::checksum::{Crc32c, crc16, verify_crc16};
use crate::protocol::{
    OB20_HEADER_SIZE, OB20_MAGIC, OB20_MAX_PAYLOAD, OB20_TAIL_SIZE, OB20_VERSION, Ob20Header,
    PRE_FIRST_REQUEST_ID, REQUEST_ID_MODULO, ob20_flags,
};

const READ_CHUNK_SIZE: usize = 8192;

/// Per-connection identity and sequencing state.
///
/// Owned exclusively by the engine bound to one socket; request ids are
/// random-seeded at construction and advance once per logical request.
#[derive(Debug)]
pub struct ProtocolState {
    connection_id: u32,
    request_id: u32,
    ob_seq: u8,
}

impl ProtocolState {
    /// Create state for a connection, seeding the request id randomly.
    pub fn new(connection_id: u32) -> Self {
        let seed = rand::random::<u32>() % REQUEST_ID_MODULO;
        Self::with_request_id(connection_id, if seed == 0 { 1 } else { seed })
    }

    /// Create state with an explicit starting request id.
    pub fn with_request_id(connection_id: u32, request_id: u32) -> Self {
        Self {
            connection_id,
            request_id: request_id % REQUEST_ID_MODULO,
            ob_seq: 0,
        }
    }

    /// Connection identity stamped into and checked against every frame.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Rebind the connection identity (from the handshake).
    pub fn set_connection_id(&mut self, connection_id: u32) {
        self.connection_id = connection_id;
    }

    /// Id of the request currently in flight.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Overwrite the request id (handshake seeding or tests).
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id % REQUEST_ID_MODULO;
    }

    /// Advance to the next logical request: bump the 24-bit request id and
    /// reset the per-request frame counter.
    fn begin_request(&mut self) {
        self.request_id = (self.request_id + 1) % REQUEST_ID_MODULO;
        self.ob_seq = 0;
    }

    /// Per-request frame counter, post-incremented, wrapping at 256.
    fn next_ob_seq(&mut self) -> u8 {
        let seq = self.ob_seq;
        self.ob_seq = self.ob_seq.wrapping_add(1);
        seq
    }
}

/// Codec for the OB20 envelope, wrapping and unwrapping logical requests.
#[derive(Debug)]
pub struct Ob20Codec {
    state: ProtocolState,
    checksums: bool,
    new_extra_info: bool,
    tail_crc: Crc32c,
}

impl Ob20Codec {
    /// Create a codec around the given connection state.
    pub fn new(state: ProtocolState) -> Self {
        Self {
            state,
            checksums: true,
            new_extra_info: false,
            tail_crc: Crc32c::new(),
        }
    }

    /// Access the connection state.
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Mutable access to the connection state.
    pub fn state_mut(&mut self) -> &mut ProtocolState {
        &mut self.state
    }

    /// Turn header and tail checksums on or off for outbound frames.
    /// Inbound verification always follows the stored value: 0 means the
    /// peer disabled checksumming for that frame.
    pub fn enable_checksums(&mut self, enabled: bool) {
        self.checksums = enabled;
    }

    /// Select the new extra-info serialization flag for outbound frames.
    pub fn set_new_extra_info(&mut self, enabled: bool) {
        self.new_extra_info = enabled;
    }

    /// Wrap one logical request.
    ///
    /// `embedded` is the standard-frame byte run of the request (continuation
    /// and terminator frames included); `extra` is the already-serialized
    /// extra-info block, attached ahead of the embedded bytes on the first
    /// chunk. The payload is split into chunks of at most
    /// [`OB20_MAX_PAYLOAD`] bytes; the extra-info block is never split, so a
    /// block that alone exceeds the limit is a configuration error.
    pub fn write_request<W: Write>(
        &mut self,
        writer: &mut W,
        embedded: &[u8],
        extra: Option<&[u8]>,
    ) -> Result<()> {
        if let Some(extra) = extra {
            if 4 + extra.len() > OB20_MAX_PAYLOAD {
                return Err(Error::ExtraInfoTooLarge {
                    length: 4 + extra.len(),
                    max: OB20_MAX_PAYLOAD,
                });
            }
        }

        self.state.begin_request();

        let mut payload = Vec::with_capacity(
            embedded.len() + extra.map_or(0, |e| e.len() + 4),
        );
        if let Some(extra) = extra {
            payload.extend_from_slice(&(extra.len() as u32).to_le_bytes());
            payload.extend_from_slice(extra);
        }
        payload.extend_from_slice(embedded);

        let chunk_count = payload.len().div_ceil(OB20_MAX_PAYLOAD).max(1);
        for (index, chunk) in payload
            .chunks(OB20_MAX_PAYLOAD)
            .chain(std::iter::once(&[][..]).take(usize::from(payload.is_empty())))
            .enumerate()
        {
            let mut flags = 0;
            if index == 0 && extra.is_some() {
                flags |= ob20_flags::EXTRA_INFO_EXIST;
                if self.new_extra_info {
                    flags |= ob20_flags::IS_NEW_EXTRA_INFO;
                }
            }
            if index == chunk_count - 1 {
                flags |= ob20_flags::IS_LAST_PACKET;
            }
            self.write_chunk(writer, chunk, flags)?;
        }
        Ok(())
    }

    /// Write a single OB20 frame carrying `chunk`.
    fn write_chunk<W: Write>(&mut self, writer: &mut W, chunk: &[u8], flags: u32) -> Result<()> {
        let ob_seq = self.state.next_ob_seq();
        let header = Ob20Header::for_chunk(
            self.state.connection_id,
            self.state.request_id,
            ob_seq,
            chunk.len() as u32,
            flags,
        );
        let mut header_bytes = header.to_bytes();
        if self.checksums {
            let checksum = crc16(&header_bytes[Ob20Header::CHECKSUM_RANGE]);
            header_bytes[Ob20Header::SIZE - 2..].copy_from_slice(&checksum.to_le_bytes());
        }
        writer.write_all(&header_bytes)?;
        writer.write_all(chunk)?;

        let tail = if self.checksums {
            self.tail_crc.update(chunk);
            self.tail_crc.value()
        } else {
            0
        };
        writer.write_all(&tail.to_le_bytes())?;
        Ok(())
    }

    /// Unwrap one logical request from the stream.
    ///
    /// Reads frames until `IS_LAST_PACKET`, validating identity and
    /// sequencing on each, and returns the reassembled embedded
    /// standard-frame bytes together with the raw extra-info block, if the
    /// request carried one.
    pub fn read_request<R: Read>(&mut self, reader: &mut R) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut embedded = Vec::new();
        let mut extra = None;
        let mut expected_seq: Option<u8> = None;

        loop {
            let header = self.read_header(reader)?;
            let first_chunk = expected_seq.is_none();

            // The first chunk of a request seeds the sequence expectation;
            // every later chunk must continue it.
            match expected_seq {
                None => {}
                Some(expected) if header.ob_seq == expected => {}
                Some(expected) => {
                    return Err(Error::Desync {
                        field: "ob seq",
                        expected: u64::from(expected),
                        actual: u64::from(header.ob_seq),
                    });
                }
            }
            expected_seq = Some(header.ob_seq.wrapping_add(1));

            let payload = self.read_payload(reader, header.payload_length as usize)?;

            let tail = {
                let mut tail_bytes = [0u8; 4];
                reader.read_exact(&mut tail_bytes)?;
                u32::from_le_bytes(tail_bytes)
            };
            self.tail_crc.verify(tail)?;

            let mut body: &[u8] = &payload;
            if header.has_extra_info() {
                // Extra info only ever rides the first chunk.
                if !first_chunk {
                    return Err(Error::Desync {
                        field: "extra info flag",
                        expected: 0,
                        actual: u64::from(ob20_flags::EXTRA_INFO_EXIST),
                    });
                }
                let (block, rest) = split_extra_info(body)?;
                extra = Some(block.to_vec());
                body = rest;
            }
            embedded.extend_from_slice(body);

            if header.is_last() {
                break;
            }
        }

        Ok((embedded, extra))
    }

    /// Read and validate one OB20 header.
    ///
    /// Checks run in a fixed order: header checksum, compress length
    /// consistency, uncompress length, magic, version, connection id,
    /// request id, with the per-frame sequence handled by the caller.
    fn read_header<R: Read>(&mut self, reader: &mut R) -> Result<Ob20Header> {
        let mut bytes = [0u8; Ob20Header::SIZE];
        reader.read_exact(&mut bytes)?;
        let header = Ob20Header::from_bytes(&bytes);

        verify_crc16(header.header_checksum, &bytes[Ob20Header::CHECKSUM_RANGE])?;

        // Widen before adding: a hostile payload length near u32::MAX must
        // fail the comparison, not overflow.
        let expected_compress =
            u64::from(header.payload_length) + (OB20_HEADER_SIZE + OB20_TAIL_SIZE) as u64;
        if u64::from(header.compress_length) != expected_compress {
            return Err(Error::Desync {
                field: "compress length",
                expected: expected_compress,
                actual: u64::from(header.compress_length),
            });
        }
        if header.uncompress_length != 0 {
            return Err(Error::Desync {
                field: "uncompress length",
                expected: 0,
                actual: u64::from(header.uncompress_length),
            });
        }
        if header.magic != OB20_MAGIC {
            return Err(Error::Desync {
                field: "magic",
                expected: u64::from(OB20_MAGIC),
                actual: u64::from(header.magic),
            });
        }
        if header.version != OB20_VERSION {
            return Err(Error::Desync {
                field: "version",
                expected: u64::from(OB20_VERSION),
                actual: u64::from(header.version),
            });
        }
        if header.connection_id != self.state.connection_id {
            return Err(Error::Desync {
                field: "connection id",
                expected: u64::from(self.state.connection_id),
                actual: u64::from(header.connection_id),
            });
        }
        let expected_request = if self.state.request_id == 0 {
            PRE_FIRST_REQUEST_ID
        } else {
            self.state.request_id
        };
        if header.request_id != expected_request {
            return Err(Error::Desync {
                field: "request id",
                expected: u64::from(expected_request),
                actual: u64::from(header.request_id),
            });
        }
        Ok(header)
    }

    /// Read the payload incrementally, feeding the running tail checksum.
    fn read_payload<R: Read>(&mut self, reader: &mut R, length: usize) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(length);
        let mut scratch = [0u8; READ_CHUNK_SIZE];
        let mut remaining = length;
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK_SIZE);
            reader.read_exact(&mut scratch[..n])?;
            self.tail_crc.update(&scratch[..n]);
            payload.extend_from_slice(&scratch[..n]);
            remaining -= n;
        }
        Ok(payload)
    }
}

/// Split an extra-info block off the front of the first chunk's payload.
fn split_extra_info(payload: &[u8]) -> Result<(&[u8], &[u8])> {
    if payload.len() < 4 {
        return Err(Error::TruncatedInput {
            context: "extra-info length prefix",
        });
    }
    let len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let rest = &payload[4..];
    if rest.len() < len {
        return Err(Error::TruncatedInput {
            context: "extra-info block",
        });
    }
    Ok((&rest[..len], &rest[len..]))
}
