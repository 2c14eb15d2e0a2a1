//! Refill budgets and buffer planning.

use crate::error::ConfigurationError;

/// Upper bound on a planned refill buffer, unless a single packet is larger.
pub const MAX_BUFFER_BYTES: usize = 0x10000;
/// Lower bound on a planned refill buffer.
pub const MIN_BUFFER_BYTES: usize = 0x4000;
/// Buffer duration used when the caller passes a non-finite or non-positive value.
pub const DEFAULT_BUFFER_SECONDS: f64 = 0.5;

/// Per-refill budgets, fixed when a cursor is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeederConfig {
    /// Max packets described by one refill.
    pub max_packets_per_refill: usize,
    /// Max encoded bytes copied by one refill.
    pub max_bytes_per_refill: usize,
}

impl Default for FeederConfig {
    /// 64 KiB per refill, enough descriptors for packets averaging 64 bytes.
    fn default() -> Self {
        Self {
            max_packets_per_refill: MAX_BUFFER_BYTES / 64,
            max_bytes_per_refill: MAX_BUFFER_BYTES,
        }
    }
}

/// The parts of a stream format that buffer planning depends on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Frames per packet; `0` when packets vary in duration.
    pub frames_per_packet: u32,
    /// Largest packet the source can produce, in bytes.
    pub max_packet_size: u32,
}

impl FeederConfig {
    /// Reject budgets that could never produce a packet.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_packets_per_refill == 0 || self.max_bytes_per_refill == 0 {
            return Err(ConfigurationError::ZeroBudget {
                max_packets: self.max_packets_per_refill,
                max_bytes: self.max_bytes_per_refill,
            });
        }
        Ok(())
    }

    /// Size refill budgets to hold roughly `seconds` of audio.
    ///
    /// - Constant-duration packets: `sample_rate / frames_per_packet * seconds` packets of
    ///   `max_packet_size` bytes.
    /// - Variable-duration packets: [`MAX_BUFFER_BYTES`], or one max packet if larger.
    ///
    /// The byte budget is then clamped to `[MIN_BUFFER_BYTES, MAX_BUFFER_BYTES]`, except that
    /// it never drops below `max_packet_size`. The packet budget is however many max-size
    /// packets fit the byte budget.
    pub fn for_duration(format: &BufferFormat, seconds: f64) -> Result<Self, ConfigurationError> {
        if format.max_packet_size == 0 {
            return Err(ConfigurationError::UnknownPacketSize);
        }

        let secs = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            DEFAULT_BUFFER_SECONDS
        };
        let max_packet = format.max_packet_size as usize;

        let mut bytes = if format.frames_per_packet > 0 {
            let packets_for_time =
                format.sample_rate as f64 / format.frames_per_packet as f64 * secs;
            (packets_for_time * max_packet as f64) as usize
        } else {
            MAX_BUFFER_BYTES.max(max_packet)
        };

        if bytes > MAX_BUFFER_BYTES && bytes > max_packet {
            bytes = MAX_BUFFER_BYTES.max(max_packet);
        } else if bytes < MIN_BUFFER_BYTES {
            bytes = MIN_BUFFER_BYTES.max(max_packet);
        }

        let packets = (bytes / max_packet).max(1);
        tracing::debug!(
            sample_rate = format.sample_rate,
            frames_per_packet = format.frames_per_packet,
            max_packet_size = format.max_packet_size,
            seconds = secs,
            max_bytes_per_refill = bytes,
            max_packets_per_refill = packets,
            "planned refill budgets"
        );

        Ok(Self {
            max_packets_per_refill: packets,
            max_bytes_per_refill: bytes,
        })
    }
}
