use thiserror::Error;

/// Errors that can occur while opening, polling or feeding a loopback stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unsupported mix format: {0}")]
    UnsupportedFormat(String),

    /// The endpoint was removed or its format changed mid-capture.
    #[error("audio device invalidated")]
    DeviceInvalidated,

    #[error("packet transfer failed: {0}")]
    PacketTransfer(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("failed to emit record: {0}")]
    Emit(String),

    #[error("output consumer closed the stream")]
    ConsumerClosed,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl FeedError {
    /// Whether this error ends a running capture loop.
    ///
    /// Everything else raised during capture is a per-packet failure:
    /// the packet is skipped and the loop keeps polling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceInvalidated | Self::ConsumerClosed)
    }
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            Self::ConsumerClosed
        } else {
            Self::Emit(e.to_string())
        }
    }
}
