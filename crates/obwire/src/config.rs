//! Engine configuration.

/// Which envelope wraps logical packets on the wire.
///
/// Chosen once from the negotiated capabilities; the engine never switches
/// mode on a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    /// Bare standard packets
    #[default]
    Standard,
    /// Standard packets inside the zlib compressed envelope
    Compressed,
    /// Standard packets inside the OB20 envelope
    Ob20,
}

/// Configuration for a [`PacketEngine`](crate::engine::PacketEngine).
///
/// Builder-style: chain setters off `EngineConfig::new()`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Envelope wrapping logical packets
    pub mode: EnvelopeMode,
    /// Connection identity stamped into OB20 frames
    pub connection_id: u32,
    /// Write OB20 header and tail checksums
    pub checksums: bool,
    /// Largest command the engine will send, in bytes
    pub max_allowed_packet: usize,
    /// zlib level for the compressed envelope (0-9)
    pub compression_level: u32,
    /// Serialize extra info in the new byte-map format
    pub use_new_extra_info: bool,
    /// Starting request id; random when unset
    pub initial_request_id: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EnvelopeMode::Standard,
            connection_id: 0,
            checksums: true,
            max_allowed_packet: 64 * 1024 * 1024,
            compression_level: 6,
            use_new_extra_info: false,
            initial_request_id: None,
        }
    }
}

impl EngineConfig {
    /// Default configuration: standard envelope, checksums on, 64MB limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the envelope mode.
    pub fn mode(mut self, mode: EnvelopeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the connection id validated against inbound OB20 frames.
    pub fn connection_id(mut self, connection_id: u32) -> Self {
        self.connection_id = connection_id;
        self
    }

    /// Enable or disable OB20 checksums on outbound frames.
    pub fn checksums(mut self, enabled: bool) -> Self {
        self.checksums = enabled;
        self
    }

    /// Set the maximum command size.
    pub fn max_allowed_packet(mut self, bytes: usize) -> Self {
        self.max_allowed_packet = bytes;
        self
    }

    /// Set the zlib compression level.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Use the new extra-info serialization.
    pub fn use_new_extra_info(mut self, enabled: bool) -> Self {
        self.use_new_extra_info = enabled;
        self
    }

    /// Seed the request id instead of randomizing it.
    pub fn initial_request_id(mut self, request_id: u32) -> Self {
        self.initial_request_id = Some(request_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.mode, EnvelopeMode::Standard);
        assert!(config.checksums);
        assert_eq!(config.max_allowed_packet, 64 * 1024 * 1024);
        assert!(!config.use_new_extra_info);
        assert!(config.initial_request_id.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new()
            .mode(EnvelopeMode::Ob20)
            .connection_id(42)
            .checksums(false)
            .max_allowed_packet(1024)
            .initial_request_id(7);
        assert_eq!(config.mode, EnvelopeMode::Ob20);
        assert_eq!(config.connection_id, 42);
        assert!(!config.checksums);
        assert_eq!(config.max_allowed_packet, 1024);
        assert_eq!(config.initial_request_id, Some(7));
    }
}
