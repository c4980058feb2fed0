//! Standard packet framer: 4-byte-header split and reassembly.
//!
//! A logical packet whose payload is longer than 16MB - 1 is sent as a run
//! of full-size frames followed by a shorter terminator frame. The
//! terminator is mandatory even when the payload length is an exact
//! multiple of the maximum: a trailing zero-length frame is what tells the
//! peer "packet ends here" rather than "more data follows".

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};

use obwire_core::Result;

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// Number of frames a payload of the given length occupies, terminator
/// included.
pub fn frame_count(payload_len: usize) -> usize {
    if payload_len < MAX_PACKET_SIZE {
        1
    } else {
        payload_len / MAX_PACKET_SIZE + 1
    }
}

/// Write a logical payload as one or more standard frames.
///
/// Returns the sequence number the next packet on this stream should use.
pub fn write_packets<W: Write>(writer: &mut W, seq_start: u8, payload: &[u8]) -> Result<u8> {
    let mut sequence_id = seq_start;

    if payload.len() < MAX_PACKET_SIZE {
        let header = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id,
        };
        writer.write_all(&header.to_bytes())?;
        writer.write_all(payload)?;
        return Ok(sequence_id.wrapping_add(1));
    }

    let mut offset = 0;
    while offset < payload.len() {
        let chunk_len = (payload.len() - offset).min(MAX_PACKET_SIZE);
        let header = PacketHeader {
            payload_length: chunk_len as u32,
            sequence_id,
        };
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&payload[offset..offset + chunk_len])?;
        offset += chunk_len;
        sequence_id = sequence_id.wrapping_add(1);
    }

    // An exact multiple of the frame size needs an empty terminator frame
    // to disambiguate "more data follows" from "packet ends here".
    if payload.len() % MAX_PACKET_SIZE == 0 {
        let header = PacketHeader {
            payload_length: 0,
            sequence_id,
        };
        writer.write_all(&header.to_bytes())?;
        sequence_id = sequence_id.wrapping_add(1);
    }

    Ok(sequence_id)
}

/// Encode a logical payload into its standard-frame byte run.
pub fn encode_packets(seq_start: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + PacketHeader::SIZE * frame_count(payload.len()));
    // Writing into a Vec cannot fail.
    let _ = write_packets(&mut out, seq_start, payload);
    out
}

/// Read one logical packet, following the continuation rule.
///
/// Returns the reassembled payload and the sequence number of the first
/// frame read. A stream that ends mid-frame yields `UnexpectedEof`.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<(Vec<u8>, u8)> {
    let (first_header, mut payload) = read_frame(reader)?;
    let sequence_id = first_header.sequence_id;

    let mut length = first_header.payload_length as usize;
    while length == MAX_PACKET_SIZE {
        let (header, chunk) = read_frame(reader)?;
        length = header.payload_length as usize;
        payload.extend_from_slice(&chunk);
    }

    Ok((payload, sequence_id))
}

fn read_frame<R: Read>(reader: &mut R) -> Result<(PacketHeader, Vec<u8>)> {
    let mut header_bytes = [0u8; PacketHeader::SIZE];
    reader.read_exact(&mut header_bytes)?;
    let header = PacketHeader::from_bytes(&header_bytes);

    let mut payload = vec![0u8; header.payload_length as usize];
    reader.read_exact(&mut payload)?;
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obwire_core::Error;
    use std::io::Cursor;

    #[test]
    fn test_single_packet_layout() {
        // "SELECT 1", seq 0: header 08 00 00 00 + ASCII bytes
        let bytes = encode_packets(0, b"SELECT 1");
        assert_eq!(&bytes[..4], &[0x08, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[4..], b"SELECT 1");

        let (payload, seq) = read_packet(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(payload, b"SELECT 1");
        assert_eq!(seq, 0);
    }

    #[test]
    fn test_empty_packet() {
        let bytes = encode_packets(3, b"");
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x03]);
        let (payload, seq) = read_packet(&mut Cursor::new(&bytes)).unwrap();
        assert!(payload.is_empty());
        assert_eq!(seq, 3);
    }

    #[test]
    fn test_split_roundtrip() {
        let payload = vec![0xA5u8; MAX_PACKET_SIZE + 1000];
        let bytes = encode_packets(0, &payload);

        // First frame is full-size, second carries the remainder.
        assert_eq!(&bytes[..4], &[0xFF, 0xFF, 0xFF, 0x00]);
        let second = 4 + MAX_PACKET_SIZE;
        assert_eq!(&bytes[second..second + 4], &[0xE8, 0x03, 0x00, 0x01]);

        let (decoded, seq) = read_packet(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(seq, 0);
    }

    #[test]
    fn test_exact_multiple_gets_empty_terminator() {
        let payload = vec![0x11u8; MAX_PACKET_SIZE];
        let bytes = encode_packets(0, &payload);

        // Full frame + zero-length terminator with the next sequence.
        assert_eq!(bytes.len(), 4 + MAX_PACKET_SIZE + 4);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(frame_count(payload.len()), 2);

        let (decoded, _) = read_packet(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded.len(), MAX_PACKET_SIZE);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_double_max_roundtrip() {
        let payload = vec![0x22u8; 2 * MAX_PACKET_SIZE];
        let bytes = encode_packets(5, &payload);

        // Two full frames plus the terminator.
        assert_eq!(bytes.len(), 3 * 4 + 2 * MAX_PACKET_SIZE);
        assert_eq!(frame_count(payload.len()), 3);

        let (decoded, seq) = read_packet(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(seq, 5);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut out = Vec::new();
        let next = write_packets(&mut out, 255, b"x").unwrap();
        assert_eq!(next, 0);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_truncated_stream_is_unexpected_eof() {
        // Header promises 8 bytes, stream carries 3.
        let bytes = [0x08, 0x00, 0x00, 0x00, b'S', b'E', b'L'];
        let err = read_packet(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));

        // Stream ends inside the header itself.
        let err = read_packet(&mut Cursor::new(&[0x08, 0x00])).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }
}
