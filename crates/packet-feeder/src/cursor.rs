//! Playback cursor and the refill operation.
//!
//! A [`PlaybackCursor`] owns the read position into one source for one playback session.
//! The playback engine calls [`PlaybackCursor::refill`] once per buffer-empty event; each
//! call copies the next run of whole packets into a caller-owned [`PacketBuffer`] without
//! exceeding either budget in [`FeederConfig`].
//!
//! ## Real-time use
//! `refill` does not allocate. All storage lives in the [`PacketBuffer`] the caller
//! allocated up front. The source read itself may block.
//!
//! ## Concurrency
//! `refill` takes `&mut self`, so at most one refill per cursor can be in flight. Sources
//! are only read through `&self`, so several cursors may share one source.

use crate::config::FeederConfig;
use crate::descriptor::{PacketBuffer, Refill};
use crate::error::{ConfigurationError, FeederError, FeederResult};
use crate::source::PacketSource;

/// Whether the cursor can still produce packets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// More packets may follow.
    #[default]
    Active,
    /// The source reported exhaustion. Terminal.
    Exhausted,
}

/// Counters over successful refills.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Refill calls that returned `Ok`, including empty tail calls.
    pub refills: u64,
    /// Packets produced across all refills.
    pub packets_produced: u64,
    /// Bytes produced across all refills.
    pub bytes_produced: u64,
}

/// Read position plus per-refill budgets for one playback session over one source.
///
/// `S` is usually a borrowed or shared handle (`&Source`, `Arc<Source>`). Dropping the cursor
/// releases that handle; closing the underlying source is up to its owner.
#[derive(Debug)]
pub struct PlaybackCursor<S> {
    source: S,
    packet_position: u64,
    config: FeederConfig,
    state: PlaybackState,
    stats: CursorStats,
}

impl<S: PacketSource> PlaybackCursor<S> {
    /// Start a cursor at packet 0.
    ///
    /// Fails when either budget is zero.
    pub fn new(source: S, config: FeederConfig) -> FeederResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            packet_position: 0,
            config,
            state: PlaybackState::Active,
            stats: CursorStats::default(),
        })
    }

    /// Packets consumed so far.
    pub fn packet_position(&self) -> u64 {
        self.packet_position
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// `true` once the source has been exhausted.
    pub fn is_done(&self) -> bool {
        self.state == PlaybackState::Exhausted
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> CursorStats {
        self.stats
    }

    /// Packets left between the cursor and the end of the source.
    pub fn remaining_packets(&self) -> u64 {
        self.source
            .packet_count()
            .saturating_sub(self.packet_position)
    }

    /// Fail early if the byte budget cannot hold the source's largest packet.
    ///
    /// `refill` detects the same condition lazily; engines call this before starting playback
    /// so the failure happens at setup instead of mid-stream.
    pub fn check_source_fits(&self) -> FeederResult<()> {
        let max_packet_size = self.source.max_packet_size();
        if max_packet_size as usize > self.config.max_bytes_per_refill {
            return Err(ConfigurationError::PacketExceedsBudget {
                position: self.packet_position,
                max_packet_size,
                max_bytes_per_refill: self.config.max_bytes_per_refill,
            }
            .into());
        }
        Ok(())
    }

    /// Produce the next run of packets into `buffer` and advance the cursor.
    ///
    /// - Once [`PlaybackState::Exhausted`], every call returns an empty result without
    ///   touching the source.
    /// - A zero-packet read at the end of the source flips the cursor to `Exhausted`.
    /// - A zero-packet read before the end means a packet is larger than the byte budget;
    ///   that is a [`ConfigurationError`], not end of stream.
    ///
    /// On any error the cursor is left exactly as it was, so a
    /// [`FeederError::SourceRead`] can be retried at the same position.
    pub fn refill<'b>(&mut self, buffer: &'b mut PacketBuffer) -> FeederResult<Refill<'b>> {
        if self.state == PlaybackState::Exhausted {
            self.stats.refills += 1;
            return Ok(Refill::empty(PlaybackState::Exhausted));
        }

        let max_packets = self.config.max_packets_per_refill;
        let max_bytes = self.config.max_bytes_per_refill;
        if buffer.descriptor_capacity() < max_packets || buffer.data_capacity() < max_bytes {
            return Err(ConfigurationError::BufferTooSmall {
                descriptors: buffer.descriptor_capacity(),
                data_bytes: buffer.data_capacity(),
                max_packets,
                max_bytes,
            }
            .into());
        }

        let position = self.packet_position;
        let run = {
            let (descriptors, data) = buffer.slots_mut();
            self.source
                .read_packets(position, max_packets, max_bytes, descriptors, data)
                .map_err(|source| FeederError::SourceRead { position, source })?
        };

        if run.packets == 0 {
            if run.end_of_source {
                tracing::debug!(position, "packet source exhausted");
                self.state = PlaybackState::Exhausted;
                self.stats.refills += 1;
                return Ok(Refill::empty(PlaybackState::Exhausted));
            }
            let max_packet_size = self.source.max_packet_size();
            tracing::error!(
                position,
                max_packet_size,
                max_bytes_per_refill = max_bytes,
                "packet does not fit refill byte budget"
            );
            return Err(ConfigurationError::PacketExceedsBudget {
                position,
                max_packet_size,
                max_bytes_per_refill: max_bytes,
            }
            .into());
        }

        let next = position.saturating_add(run.packets as u64);
        if run.packets > max_packets || run.bytes > max_bytes || next > self.source.packet_count()
        {
            return Err(ConfigurationError::SourceOverrun {
                position,
                packets: run.packets,
                bytes: run.bytes,
            }
            .into());
        }

        self.packet_position = next;
        self.stats.refills += 1;
        self.stats.packets_produced += run.packets as u64;
        self.stats.bytes_produced += run.bytes as u64;
        tracing::trace!(
            position = next,
            packets = run.packets,
            bytes = run.bytes,
            "refill"
        );

        Ok(buffer.filled(run.packets, run.bytes, PlaybackState::Active))
    }
}
