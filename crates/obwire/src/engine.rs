//! Engine facade: one engine per stream, wrapping logical packets in the
//! negotiated envelope.
//!
//! The engine is strictly synchronous and single-owner. It holds the
//! sequence counters, the compression state and the OB20 connection state;
//! the stream is plain `Read`/`Write` and timeouts or cancellation belong
//! to the socket, not here. All three envelopes are composable codecs
//! behind one `send`/`receive` surface, so the consuming layers never
//! branch on the wire format.

use std::io::{Cursor, Read, Write};

use flate2::Compression;

use obwire_core::{Error, Result};

use crate::buffer::CommandBuffer;
use crate::compress::{Compressor, Decompressor};
use crate::config::{EngineConfig, EnvelopeMode};
use crate::framer;
use crate::ob20::{Ob20Codec, ProtocolState};
use crate::trace::{Direction, TraceSink};

/// One reassembled logical packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPacket {
    /// Reassembled payload, continuation frames already joined
    pub payload: Vec<u8>,
    /// Sequence number of the packet's first standard frame
    pub sequence_id: u8,
    /// Raw extra-info bytes, present on the first packet of an OB20
    /// request that carried them
    pub extra_info: Option<Vec<u8>>,
}

/// Packet engine bound to a single stream.
pub struct PacketEngine<S> {
    stream: S,
    mode: EnvelopeMode,
    max_allowed_packet: usize,
    sequence_id: u8,
    compressor: Compressor,
    decompressor: Decompressor,
    ob20: Ob20Codec,
    // Embedded standard-frame bytes of the current OB20 request not yet
    // handed out as logical packets.
    ob20_pending: Vec<u8>,
    ob20_pos: usize,
    ob20_extra: Option<Vec<u8>>,
    command: CommandBuffer,
    trace: Option<Box<dyn TraceSink>>,
}

impl<S> PacketEngine<S> {
    /// Bind an engine to a stream with the given configuration.
    pub fn new(stream: S, config: &EngineConfig) -> Self {
        let state = match config.initial_request_id {
            Some(request_id) => ProtocolState::with_request_id(config.connection_id, request_id),
            None => ProtocolState::new(config.connection_id),
        };
        let mut ob20 = Ob20Codec::new(state);
        ob20.enable_checksums(config.checksums);
        ob20.set_new_extra_info(config.use_new_extra_info);
        Self {
            stream,
            mode: config.mode,
            max_allowed_packet: config.max_allowed_packet,
            sequence_id: 0,
            compressor: Compressor::new(Compression::new(config.compression_level)),
            decompressor: Decompressor::new(),
            ob20,
            ob20_pending: Vec::new(),
            ob20_pos: 0,
            ob20_extra: None,
            command: CommandBuffer::new(),
            trace: None,
        }
    }

    /// Buffer for assembling the next outbound command in place.
    ///
    /// Write into it, optionally `mark()` a packet boundary, then hand the
    /// staged bytes to [`flush_command_part`](Self::flush_command_part) or
    /// [`finish_command`](Self::finish_command).
    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.command
    }

    /// The negotiated envelope mode.
    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    /// Borrow the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unbind and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Current standard-frame sequence number.
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Reset the standard-frame sequence, typically to 0 at command start.
    pub fn reset_sequence(&mut self, sequence_id: u8) {
        self.sequence_id = sequence_id;
        self.compressor.reset_sequence(sequence_id);
        self.decompressor.reset_sequence(sequence_id);
    }

    /// Id of the most recently issued OB20 request.
    pub fn current_request_id(&self) -> u32 {
        self.ob20.state().request_id()
    }

    /// Turn OB20 checksums on or off for outbound frames.
    pub fn enable_checksums(&mut self, enabled: bool) {
        self.ob20.enable_checksums(enabled);
    }

    /// Adjust the maximum command size after `max_allowed_packet` is
    /// renegotiated.
    pub fn set_max_allowed_packet(&mut self, bytes: usize) {
        self.max_allowed_packet = bytes;
    }

    /// Rebind the connection id once the handshake has assigned it.
    pub fn bind_connection_id(&mut self, connection_id: u32) {
        self.ob20.state_mut().set_connection_id(connection_id);
    }

    /// Install a frame observer; replaces any previous sink.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace = Some(sink);
    }

    /// Remove the frame observer.
    pub fn clear_trace_sink(&mut self) {
        self.trace = None;
    }

    /// Call the sink once per wire frame in `wire`.
    ///
    /// Standard frames carry their length in the first 3 bytes after a
    /// 4-byte header; both envelope framings carry the byte count of
    /// everything after their 7-byte prefix in the same position.
    fn trace_wire(&mut self, direction: Direction, wire: &[u8]) {
        let Some(sink) = self.trace.as_deref_mut() else {
            return;
        };
        let prefix = match self.mode {
            EnvelopeMode::Standard => 4,
            EnvelopeMode::Compressed | EnvelopeMode::Ob20 => 7,
        };
        let mut pos = 0;
        while pos + prefix <= wire.len() {
            let body = usize::from(wire[pos])
                | usize::from(wire[pos + 1]) << 8
                | usize::from(wire[pos + 2]) << 16;
            let end = (pos + prefix + body).min(wire.len());
            sink.on_frame(direction, &wire[pos..end]);
            pos = end;
        }
    }

    fn note_fatal<T>(result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                tracing::warn!(error = %err, "connection unusable");
            }
        }
        result
    }
}

impl<S: Write> PacketEngine<S> {
    /// Send one logical packet.
    ///
    /// `extra` is the serialized extra-info block; it rides the OB20
    /// envelope and is ignored in the other modes. A payload over the
    /// configured maximum is rejected before anything reaches the wire,
    /// so `CommandTooLarge` here is recoverable.
    pub fn send(&mut self, payload: &[u8], extra: Option<&[u8]>) -> Result<()> {
        let result = self.send_inner(payload, extra);
        Self::note_fatal(result)
    }

    fn send_inner(&mut self, payload: &[u8], extra: Option<&[u8]>) -> Result<()> {
        if payload.len() > self.max_allowed_packet {
            return Err(Error::CommandTooLarge {
                length: payload.len(),
                max: self.max_allowed_packet,
            });
        }
        self.write_wire(payload, extra)
    }

    /// Send the staged bytes up to the mark as one logical packet, keeping
    /// everything written after the mark staged for the next part.
    ///
    /// The size limit covers the whole command across all of its parts.
    /// Overflowing it before the first partial flush only costs the
    /// command; once a part is on the wire the peer holds a torn command
    /// and the overflow is the fatal `MaxAllowedPacketExceeded`.
    pub fn flush_command_part(&mut self, extra: Option<&[u8]>) -> Result<()> {
        let result = self.flush_command_inner(extra, false);
        Self::note_fatal(result)
    }

    /// Send the remaining staged bytes and reset the buffer for the next
    /// command.
    pub fn finish_command(&mut self, extra: Option<&[u8]>) -> Result<()> {
        let result = self.flush_command_inner(extra, true);
        Self::note_fatal(result)
    }

    fn flush_command_inner(&mut self, extra: Option<&[u8]>, last: bool) -> Result<()> {
        self.command.check_limit(self.max_allowed_packet)?;
        let part = self.command.flush_to_mark();
        let result = self.write_wire(&part, extra);
        if last {
            self.command.finish_command();
        }
        result
    }

    fn write_wire(&mut self, payload: &[u8], extra: Option<&[u8]>) -> Result<()> {
        let frames = framer::encode_packets(self.sequence_id, payload);
        self.sequence_id = self
            .sequence_id
            .wrapping_add(framer::frame_count(payload.len()) as u8);

        let wire = match self.mode {
            EnvelopeMode::Standard => frames,
            EnvelopeMode::Compressed => {
                let mut wire = Vec::with_capacity(frames.len() + 64);
                self.compressor.write_frames(&mut wire, &frames)?;
                wire
            }
            EnvelopeMode::Ob20 => {
                let mut wire = Vec::with_capacity(frames.len() + 64);
                self.ob20.write_request(&mut wire, &frames, extra)?;
                wire
            }
        };

        self.trace_wire(Direction::Send, &wire);
        self.stream.write_all(&wire)?;
        self.stream.flush()?;
        Ok(())
    }
}

impl<S: Read> PacketEngine<S> {
    /// Receive one logical packet, reassembling continuation frames.
    pub fn receive(&mut self) -> Result<LogicalPacket> {
        let result = self.receive_inner();
        Self::note_fatal(result)
    }

    fn receive_inner(&mut self) -> Result<LogicalPacket> {
        match self.mode {
            EnvelopeMode::Standard => {
                let mut captured = Vec::new();
                let (payload, sequence_id) = framer::read_packet(&mut TeeReader {
                    inner: &mut self.stream,
                    captured: &mut captured,
                })?;
                self.trace_wire(Direction::Receive, &captured);
                self.sequence_id =
                    sequence_id.wrapping_add(framer::frame_count(payload.len()) as u8);
                Ok(LogicalPacket {
                    payload,
                    sequence_id,
                    extra_info: None,
                })
            }
            EnvelopeMode::Compressed => {
                let mut captured = Vec::new();
                let (payload, sequence_id) = {
                    let mut tee = TeeReader {
                        inner: &mut self.stream,
                        captured: &mut captured,
                    };
                    framer::read_packet(&mut self.decompressor.stream(&mut tee))?
                };
                self.trace_wire(Direction::Receive, &captured);
                self.sequence_id =
                    sequence_id.wrapping_add(framer::frame_count(payload.len()) as u8);
                Ok(LogicalPacket {
                    payload,
                    sequence_id,
                    extra_info: None,
                })
            }
            EnvelopeMode::Ob20 => self.receive_ob20(),
        }
    }

    /// One OB20 request can embed several logical packets; frames already
    /// unwrapped wait in `ob20_pending` until the consumer asks for them.
    fn receive_ob20(&mut self) -> Result<LogicalPacket> {
        if self.ob20_pos >= self.ob20_pending.len() {
            let mut captured = Vec::new();
            let (embedded, extra) = {
                let mut tee = TeeReader {
                    inner: &mut self.stream,
                    captured: &mut captured,
                };
                self.ob20.read_request(&mut tee)?
            };
            self.trace_wire(Direction::Receive, &captured);
            self.ob20_pending = embedded;
            self.ob20_pos = 0;
            self.ob20_extra = extra;
        }

        let mut cursor = Cursor::new(&self.ob20_pending[self.ob20_pos..]);
        let (payload, sequence_id) = framer::read_packet(&mut cursor)?;
        self.ob20_pos += usize::try_from(cursor.position()).unwrap_or(usize::MAX);
        self.sequence_id = sequence_id.wrapping_add(framer::frame_count(payload.len()) as u8);

        Ok(LogicalPacket {
            payload,
            sequence_id,
            extra_info: self.ob20_extra.take(),
        })
    }
}

impl<S> std::fmt::Debug for PacketEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEngine")
            .field("mode", &self.mode)
            .field("sequence_id", &self.sequence_id)
            .field("max_allowed_packet", &self.max_allowed_packet)
            .finish_non_exhaustive()
    }
}

/// `Read` adapter that copies everything it reads into a side buffer, so
/// received wire bytes can be handed to the trace sink.
struct TeeReader<'a, R> {
    inner: &'a mut R,
    captured: &'a mut Vec<u8>,
}

impl<R: Read> Read for TeeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.captured.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}
