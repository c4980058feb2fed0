//! Wire-level frame tracing.
//!
//! A sink is injected per engine rather than registered globally, so two
//! connections can trace independently and tests can capture frames without
//! touching process state.

use std::fmt::Write as _;

/// Which way a frame moved over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Engine to peer
    Send,
    /// Peer to engine
    Receive,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "recv",
        }
    }
}

/// Observer called once per wire frame in each direction.
pub trait TraceSink {
    /// A frame's wire bytes, headers included, after encode / before decode.
    fn on_frame(&mut self, direction: Direction, bytes: &[u8]);
}

/// [`TraceSink`] that emits `tracing::trace!` hex dumps.
#[derive(Debug, Default)]
pub struct HexDumpSink {
    /// Cap on dumped bytes per frame; 0 means no cap.
    pub max_bytes: usize,
}

impl HexDumpSink {
    /// Dump every frame in full.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dump at most `max_bytes` of each frame.
    pub fn truncated(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl TraceSink for HexDumpSink {
    fn on_frame(&mut self, direction: Direction, bytes: &[u8]) {
        let shown = if self.max_bytes > 0 && bytes.len() > self.max_bytes {
            &bytes[..self.max_bytes]
        } else {
            bytes
        };
        let mut dump = String::with_capacity(shown.len() * 3);
        for (i, b) in shown.iter().enumerate() {
            if i > 0 {
                dump.push(if i % 16 == 0 { '\n' } else { ' ' });
            }
            let _ = write!(dump, "{b:02X}");
        }
        tracing::trace!(
            direction = direction.label(),
            len = bytes.len(),
            "frame\n{dump}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture {
        frames: Vec<(Direction, Vec<u8>)>,
    }

    impl TraceSink for Capture {
        fn on_frame(&mut self, direction: Direction, bytes: &[u8]) {
            self.frames.push((direction, bytes.to_vec()));
        }
    }

    #[test]
    fn test_sink_sees_directions() {
        let mut sink = Capture { frames: Vec::new() };
        sink.on_frame(Direction::Send, &[1, 2, 3]);
        sink.on_frame(Direction::Receive, &[4]);
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0], (Direction::Send, vec![1, 2, 3]));
        assert_eq!(sink.frames[1], (Direction::Receive, vec![4]));
    }

    #[test]
    fn test_hex_dump_does_not_panic() {
        let mut sink = HexDumpSink::truncated(8);
        sink.on_frame(Direction::Send, &[0xAB; 100]);
        sink.on_frame(Direction::Receive, &[]);
    }
}
