//! Error types for the pullframe protocol.
//!
//! None of these are fatal to a session. Inbound problems (bad CRC, wrong
//! length, sequence gaps) never surface as errors at all: they become negative
//! acknowledgements. The types here cover the edges of the core: building
//! outbound frames, validating configuration, and the storage and transport
//! collaborators.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when building a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit in the 16-bit length field.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload length that was supplied.
        len: usize,
        /// Largest encodable payload.
        max: usize,
    },
}

/// Errors raised by [`ProtocolConfig::validate`](crate::core::ProtocolConfig::validate).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Start markers must differ, otherwise the marker search cannot resync.
    #[error("start markers must differ (both 0x{0:02x})")]
    IdenticalMarkers(u8),

    /// DATA frames must carry at least the label byte.
    #[error("data length must be at least 1 (label byte)")]
    EmptyDataLength,

    /// The receive buffer cannot hold a full DATA payload.
    #[error("buffer capacity {capacity} is smaller than data length {data_length}")]
    CapacityTooSmall {
        /// Configured buffer capacity.
        capacity: usize,
        /// Configured DATA payload length.
        data_length: u16,
    },

    /// The buffer capacity exceeds what the length field can describe.
    #[error("buffer capacity {0} exceeds the 16-bit length field")]
    CapacityTooLarge(usize),

    /// A zero request period would send a REQUEST on every poll.
    #[error("request period must be non-zero")]
    ZeroRequestPeriod,

    /// A zero send timeout would fail every transmission.
    #[error("send timeout must be non-zero")]
    ZeroSendTimeout,
}

/// Errors reported by a [`StorageSink`](crate::core::StorageSink).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The sink has no room for another record.
    #[error("storage full")]
    Full,

    /// I/O error while persisting.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Transport errors.
///
/// Outbound control frames are fire-and-forget: these are logged by the poll
/// path and never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying link.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A write did not complete within the send timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// The link was closed by the peer or the reader hit end of stream.
    #[error("link closed")]
    Closed,

    /// A frame could not be built.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// Classify an I/O error from a write that was given `timeout`.
    pub fn from_write(error: io::Error, timeout: Duration) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout(timeout),
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => TransportError::Closed,
            _ => TransportError::Io(error),
        }
    }

    /// Check if this error ends the link (no further traffic is possible).
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed)
            || matches!(self, TransportError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }

    /// Check if the next poll cycle may succeed where this send failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            TransportError::Closed | TransportError::Frame(_) => false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Top-level pullframe errors.
#[derive(Debug, Error)]
pub enum PullframeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
