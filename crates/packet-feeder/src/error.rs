//! Error types for the refill path.
//!
//! Reaching the end of a source is not an error; it surfaces as
//! [`crate::cursor::PlaybackState::Exhausted`].

use std::io;

/// Result type used by the feeder core.
pub type FeederResult<T> = Result<T, FeederError>;

/// Errors returned by [`crate::cursor::PlaybackCursor::refill`].
#[derive(Debug, thiserror::Error)]
pub enum FeederError {
    /// Transient failure reading the source. The cursor is left untouched, so the same
    /// refill can be retried.
    #[error("source read failed at packet {position}: {source}")]
    SourceRead {
        /// Packet position the read started at.
        position: u64,
        #[source]
        source: io::Error,
    },

    /// Budgets or buffers cannot work with this source. Not retryable.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl FeederError {
    /// Whether the failed refill may be issued again at the same position.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeederError::SourceRead { .. })
    }
}

/// Fatal configuration mismatches between budgets, buffers and the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("refill budgets must be non-zero (packets={max_packets}, bytes={max_bytes})")]
    ZeroBudget { max_packets: usize, max_bytes: usize },

    #[error("source does not report a maximum packet size")]
    UnknownPacketSize,

    #[error(
        "packet buffer too small: {descriptors} descriptors / {data_bytes} bytes for \
         budgets of {max_packets} packets / {max_bytes} bytes"
    )]
    BufferTooSmall {
        descriptors: usize,
        data_bytes: usize,
        max_packets: usize,
        max_bytes: usize,
    },

    #[error(
        "packet at {position} does not fit the refill byte budget \
         ({max_bytes_per_refill} bytes, source max packet {max_packet_size} bytes)"
    )]
    PacketExceedsBudget {
        position: u64,
        max_packet_size: u32,
        max_bytes_per_refill: usize,
    },

    #[error("source returned {packets} packets / {bytes} bytes at {position}, beyond the refill limits")]
    SourceOverrun {
        position: u64,
        packets: usize,
        bytes: usize,
    },
}
