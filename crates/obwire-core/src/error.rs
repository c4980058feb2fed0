//! Error types for packet engine operations.

use std::fmt;
use std::io;

/// Which checksum failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-16 over the OB20 header bytes
    Header,
    /// CRC-32C over the OB20 payload bytes
    Payload,
}

/// The primary error type for packet engine operations.
///
/// Every variant except [`Error::CommandTooLarge`] is fatal: the stream is in
/// an undefined position and the connection must be discarded.
#[derive(Debug)]
pub enum Error {
    /// A decoder ran out of bytes inside an in-memory structure
    TruncatedInput {
        /// What was being decoded when the input ended
        context: &'static str,
    },
    /// The stream ended in the middle of a wire frame
    UnexpectedEof,
    /// A stored checksum did not match the computed one
    ChecksumMismatch {
        /// Which checksum failed
        kind: ChecksumKind,
        /// Value carried on the wire
        expected: u32,
        /// Value computed over the received bytes
        actual: u32,
    },
    /// Sequence, identity, magic or version mismatch; sender and receiver
    /// disagree on frame boundaries
    Desync {
        /// Header field that failed validation
        field: &'static str,
        /// Value the engine expected
        expected: u64,
        /// Value carried on the wire
        actual: u64,
    },
    /// Inflated output length differed from the recorded uncompressed length
    DecompressionLengthMismatch {
        /// Length recorded in the compressed frame header
        expected: usize,
        /// Length actually produced by inflation
        actual: usize,
    },
    /// Command exceeds the configured size limit before any bytes were sent.
    /// The caller may abort the command and keep the connection.
    CommandTooLarge {
        /// Total command length so far
        length: usize,
        /// Configured maximum
        max: usize,
    },
    /// Command exceeded the size limit after a partial send. The peer has
    /// already received a truncated command, so the connection is unusable.
    MaxAllowedPacketExceeded {
        /// Total command length so far
        length: usize,
        /// Configured maximum
        max: usize,
    },
    /// The extra-info block alone does not fit in a single OB20 frame
    ExtraInfoTooLarge {
        /// Encoded extra-info length including its 4-byte prefix
        length: usize,
        /// Largest payload one OB20 frame can carry
        max: usize,
    },
    /// I/O errors other than end-of-stream
    Io(io::Error),
}

impl Error {
    /// Does this error leave the connection unusable?
    ///
    /// Fatal errors must propagate up as connection-level failures; the
    /// socket is in a "broken, must close" state and nothing in the engine
    /// attempts partial recovery.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::CommandTooLarge { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedInput { context } => {
                write!(f, "input ended while decoding {context}")
            }
            Error::UnexpectedEof => write!(f, "stream ended in the middle of a frame"),
            Error::ChecksumMismatch {
                kind,
                expected,
                actual,
            } => {
                let what = match kind {
                    ChecksumKind::Header => "header CRC-16",
                    ChecksumKind::Payload => "payload CRC-32C",
                };
                write!(
                    f,
                    "{what} mismatch: stored {expected:#x}, computed {actual:#x}"
                )
            }
            Error::Desync {
                field,
                expected,
                actual,
            } => write!(
                f,
                "protocol desync on {field}: expected {expected:#x}, got {actual:#x}"
            ),
            Error::DecompressionLengthMismatch { expected, actual } => write!(
                f,
                "decompressed length mismatch: header says {expected} bytes, inflated {actual}"
            ),
            Error::CommandTooLarge { length, max } => write!(
                f,
                "command of {length} bytes exceeds max_allowed_packet ({max})"
            ),
            Error::MaxAllowedPacketExceeded { length, max } => write!(
                f,
                "command of {length} bytes exceeds max_allowed_packet ({max}) after partial send"
            ),
            Error::ExtraInfoTooLarge { length, max } => write!(
                f,
                "extra-info block of {length} bytes exceeds the frame payload limit ({max})"
            ),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Error::UnexpectedEof;
        }
        // Codec layers that speak through `std::io::Read` adapters wrap
        // protocol errors in an io::Error; unwrap them on the way back up.
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Io(err),
        }
    }
}

/// Result type alias for packet engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_too_large_is_recoverable() {
        let recoverable = Error::CommandTooLarge {
            length: 100,
            max: 50,
        };
        assert!(!recoverable.is_fatal());

        let fatal = Error::MaxAllowedPacketExceeded {
            length: 100,
            max: 50,
        };
        assert!(fatal.is_fatal());
        assert!(Error::UnexpectedEof.is_fatal());
    }

    #[test]
    fn eof_io_errors_fold_into_unexpected_eof() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        assert!(matches!(Error::from(eof), Error::UnexpectedEof));

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(Error::from(refused), Error::Io(_)));
    }

    #[test]
    fn wrapped_protocol_errors_round_trip_through_io() {
        let inner = Error::Desync {
            field: "magic",
            expected: 0x20AB,
            actual: 0,
        };
        let wrapped = io::Error::other(inner);
        match Error::from(wrapped) {
            Error::Desync {
                field, expected, ..
            } => {
                assert_eq!(field, "magic");
                assert_eq!(expected, 0x20AB);
            }
            other => panic!("expected Desync, got {other:?}"),
        }
    }

    #[test]
    fn display_names_the_failing_field() {
        let err = Error::Desync {
            field: "request id",
            expected: 5,
            actual: 6,
        };
        let text = err.to_string();
        assert!(text.contains("request id"));
        assert!(text.contains("0x5"));
    }
}
