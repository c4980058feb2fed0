//! Compressed envelope: 7-byte-header frames with optionally deflated
//! bodies.
//!
//! One compressed frame may carry several complete standard frames, or a
//! slice of one that continues in the next compressed frame. The reader
//! therefore exposes the decompressed bytes as a plain byte stream and
//! leaves standard-frame reassembly to the framer: the 16MB continuation
//! rule is evaluated after decompression.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use obwire_core::{Error, Result};

use crate::protocol::{CompressedHeader, MAX_PACKET_SIZE, MIN_COMPRESS_LENGTH};

/// Writer half of the compressed envelope.
///
/// Owns the compressed-frame sequence counter; the stream itself is passed
/// in per call so that one engine can drive reads and writes over a single
/// socket.
#[derive(Debug)]
pub struct Compressor {
    level: Compression,
    sequence_id: u8,
}

impl Compressor {
    /// Create a compressor writing frames at the given zlib level.
    pub fn new(level: Compression) -> Self {
        Self {
            level,
            sequence_id: 0,
        }
    }

    /// Reset the compressed-frame sequence counter.
    pub fn reset_sequence(&mut self, sequence_id: u8) {
        self.sequence_id = sequence_id;
    }

    /// Wrap a standard-frame byte run into compressed envelope frames.
    ///
    /// Runs longer than 16MB - 1 are split across frames. Each chunk is
    /// deflated unless it is too short to be worth it or deflation fails to
    /// shrink it, in which case the chunk is stored raw with an uncompressed
    /// length of 0.
    pub fn write_frames<W: Write>(&mut self, writer: &mut W, frames: &[u8]) -> Result<()> {
        for chunk in frames.chunks(MAX_PACKET_SIZE) {
            let deflated = if chunk.len() >= MIN_COMPRESS_LENGTH {
                let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
                encoder.write_all(chunk)?;
                let out = encoder.finish()?;
                if out.len() < chunk.len() { Some(out) } else { None }
            } else {
                None
            };

            let (body, uncompressed_length): (&[u8], u32) = match &deflated {
                Some(out) => (out, chunk.len() as u32),
                None => (chunk, 0),
            };

            let header = CompressedHeader {
                compressed_length: body.len() as u32,
                sequence_id: self.sequence_id,
                uncompressed_length,
            };
            writer.write_all(&header.to_bytes())?;
            writer.write_all(body)?;
            self.sequence_id = self.sequence_id.wrapping_add(1);
        }
        Ok(())
    }
}

/// Reader half of the compressed envelope.
///
/// The cache bridges compressed frames: bytes of a standard frame that
/// continues in the next compressed frame stay here between reads.
#[derive(Debug, Default)]
pub struct Decompressor {
    cache: Vec<u8>,
    pos: usize,
    sequence_id: u8,
}

impl Decompressor {
    /// Create an empty decompressor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the compressed-frame sequence counter.
    pub fn reset_sequence(&mut self, sequence_id: u8) {
        self.sequence_id = sequence_id;
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.cache.len() - self.pos
    }

    /// Borrow this decompressor together with the underlying stream as a
    /// `Read` over the decompressed bytes.
    pub fn stream<'a, R: Read>(&'a mut self, inner: &'a mut R) -> DecompressStream<'a, R> {
        DecompressStream {
            decompressor: self,
            inner,
        }
    }

    /// Pull one compressed frame off the stream into the cache, validating
    /// the compressed-frame sequence.
    fn fill<R: Read>(&mut self, inner: &mut R) -> Result<()> {
        let mut header_bytes = [0u8; CompressedHeader::SIZE];
        inner.read_exact(&mut header_bytes)?;
        let header = CompressedHeader::from_bytes(&header_bytes);
        if header.sequence_id != self.sequence_id {
            return Err(Error::Desync {
                field: "compressed seq",
                expected: u64::from(self.sequence_id),
                actual: u64::from(header.sequence_id),
            });
        }
        self.sequence_id = self.sequence_id.wrapping_add(1);

        let mut body = vec![0u8; header.compressed_length as usize];
        inner.read_exact(&mut body)?;

        if self.pos == self.cache.len() {
            self.cache.clear();
            self.pos = 0;
        }

        if header.uncompressed_length == 0 {
            // Stored raw, not worth compressing.
            self.cache.extend_from_slice(&body);
            return Ok(());
        }

        let expected = header.uncompressed_length as usize;
        let before = self.cache.len();
        let mut decoder = ZlibDecoder::new(body.as_slice());
        // Stream corruption surfaces as the underlying zlib error; the
        // mismatch variant is reserved for a clean inflate of the wrong
        // size.
        decoder.read_to_end(&mut self.cache)?;
        let actual = self.cache.len() - before;
        if actual != expected {
            return Err(Error::DecompressionLengthMismatch { expected, actual });
        }
        Ok(())
    }
}

/// `Read` adapter over the decompressed byte stream.
#[derive(Debug)]
pub struct DecompressStream<'a, R> {
    decompressor: &'a mut Decompressor,
    inner: &'a mut R,
}

impl<R: Read> Read for DecompressStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.decompressor.pending() == 0 {
            self.decompressor
                .fill(self.inner)
                .map_err(io::Error::other)?;
        }
        let start = self.decompressor.pos;
        let n = buf.len().min(self.decompressor.pending());
        buf[..n].copy_from_slice(&self.decompressor.cache[start..start + n]);
        self.decompressor.pos += n;
        Ok(n)
    }
}
