//! Packet descriptors and the caller-owned buffer a refill writes into.

use crate::config::FeederConfig;
use crate::cursor::PlaybackState;

/// Location of one packet inside a refill's contiguous data buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketDescriptor {
    /// Byte offset from the start of the refill data.
    pub start_offset: u64,
    /// Frames in this packet when packet duration varies, else `0`.
    pub variable_frames: u32,
    /// Encoded size of the packet in bytes.
    pub data_byte_size: u32,
}

impl PacketDescriptor {
    /// Byte range of the packet within the refill data.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.start_offset as usize;
        start..start + self.data_byte_size as usize
    }
}

/// Pre-allocated storage for a single refill.
///
/// The playback engine allocates one of these per queue buffer up front and hands it to
/// [`crate::cursor::PlaybackCursor::refill`] by mutable reference. The feeder only writes
/// into the existing slots; it never grows, shrinks or keeps the buffer.
#[derive(Clone, Debug)]
pub struct PacketBuffer {
    descriptors: Box<[PacketDescriptor]>,
    data: Box<[u8]>,
}

impl PacketBuffer {
    /// Allocate room for `max_packets` descriptors and `max_bytes` of packet data.
    pub fn new(max_packets: usize, max_bytes: usize) -> Self {
        Self {
            descriptors: vec![PacketDescriptor::default(); max_packets].into_boxed_slice(),
            data: vec![0u8; max_bytes].into_boxed_slice(),
        }
    }

    /// Allocate a buffer that exactly fits `cfg`'s budgets.
    pub fn for_config(cfg: &FeederConfig) -> Self {
        Self::new(cfg.max_packets_per_refill, cfg.max_bytes_per_refill)
    }

    /// Number of descriptor slots.
    pub fn descriptor_capacity(&self) -> usize {
        self.descriptors.len()
    }

    /// Number of data bytes.
    pub fn data_capacity(&self) -> usize {
        self.data.len()
    }

    /// All descriptor slots; only the prefix written by the last refill is meaningful.
    pub fn descriptors(&self) -> &[PacketDescriptor] {
        &self.descriptors
    }

    /// All data bytes; only the prefix written by the last refill is meaningful.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn slots_mut(&mut self) -> (&mut [PacketDescriptor], &mut [u8]) {
        (&mut self.descriptors, &mut self.data)
    }

    /// Borrow the first `packets` descriptors and `bytes` of data as a [`Refill`].
    pub(crate) fn filled(&self, packets: usize, bytes: usize, state: PlaybackState) -> Refill<'_> {
        Refill {
            packets,
            bytes,
            state,
            descriptors: &self.descriptors[..packets],
            data: &self.data[..bytes],
        }
    }
}

/// Outcome of one refill: the filled prefix of a [`PacketBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Refill<'b> {
    /// Packets produced by this call.
    pub packets: usize,
    /// Total encoded bytes produced by this call.
    pub bytes: usize,
    /// Cursor state after the call.
    pub state: PlaybackState,
    /// One descriptor per produced packet.
    pub descriptors: &'b [PacketDescriptor],
    /// Concatenated packet bytes.
    pub data: &'b [u8],
}

impl<'b> Refill<'b> {
    /// An empty result carrying `state`.
    pub(crate) fn empty(state: PlaybackState) -> Self {
        Self {
            packets: 0,
            bytes: 0,
            state,
            descriptors: &[],
            data: &[],
        }
    }

    /// `true` once the cursor has reached the end of its source.
    pub fn is_done(&self) -> bool {
        self.state == PlaybackState::Exhausted
    }

    /// Bytes of packet `index`, or `None` when out of range.
    pub fn packet(&self, index: usize) -> Option<&'b [u8]> {
        let desc = self.descriptors.get(index)?;
        self.data.get(desc.range())
    }

    /// Iterate over every produced packet's bytes in order.
    pub fn packets(&self) -> impl Iterator<Item = &'b [u8]> + '_ {
        (0..self.packets).filter_map(move |i| self.packet(i))
    }

    /// Sum of `variable_frames` over the produced packets.
    pub fn variable_frames(&self) -> u64 {
        self.descriptors
            .iter()
            .map(|d| d.variable_frames as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_config_matches_budgets() {
        let cfg = FeederConfig {
            max_packets_per_refill: 4,
            max_bytes_per_refill: 1000,
        };
        let buf = PacketBuffer::for_config(&cfg);
        assert_eq!(buf.descriptor_capacity(), 4);
        assert_eq!(buf.data_capacity(), 1000);
    }

    #[test]
    fn refill_packet_slices_by_descriptor() {
        let mut buf = PacketBuffer::new(2, 8);
        {
            let (descs, data) = buf.slots_mut();
            data[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
            descs[0] = PacketDescriptor {
                start_offset: 0,
                variable_frames: 0,
                data_byte_size: 3,
            };
            descs[1] = PacketDescriptor {
                start_offset: 3,
                variable_frames: 0,
                data_byte_size: 2,
            };
        }

        let refill = buf.filled(2, 5, PlaybackState::Active);
        assert_eq!(refill.packet(0), Some(&[1, 2, 3][..]));
        assert_eq!(refill.packet(1), Some(&[4, 5][..]));
        assert_eq!(refill.packet(2), None);
        assert_eq!(refill.packets().count(), 2);
        assert!(!refill.is_done());
    }

    #[test]
    fn empty_refill_has_no_packets() {
        let refill = Refill::empty(PlaybackState::Exhausted);
        assert_eq!(refill.packets, 0);
        assert_eq!(refill.bytes, 0);
        assert!(refill.descriptors.is_empty());
        assert!(refill.is_done());
        assert_eq!(refill.variable_frames(), 0);
    }
}
