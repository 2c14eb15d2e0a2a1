//! Packetized sources the feeder reads from.
//!
//! A source is read-only from the feeder's point of view: every method takes `&self`, so one
//! source can back any number of independent cursors.

use std::io;
use std::sync::Arc;

use crate::descriptor::PacketDescriptor;

/// One run of whole packets returned by [`PacketSource::read_packets`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketRun {
    /// Packets described and copied.
    pub packets: usize,
    /// Bytes copied.
    pub bytes: usize,
    /// No packets remain at or after `start + packets`.
    pub end_of_source: bool,
}

/// A randomly addressable sequence of encoded packets.
pub trait PacketSource {
    /// Copy the run of whole packets starting at `start` that fits within `max_packets` and
    /// `max_bytes` into `data`, describing each one in `descriptors`.
    ///
    /// Descriptor offsets are relative to the start of `data`. Returning zero packets with
    /// `end_of_source == false` means the packet at `start` alone exceeds `max_bytes`.
    fn read_packets(
        &self,
        start: u64,
        max_packets: usize,
        max_bytes: usize,
        descriptors: &mut [PacketDescriptor],
        data: &mut [u8],
    ) -> io::Result<PacketRun>;

    /// Total number of packets in the source.
    fn packet_count(&self) -> u64;

    /// Largest packet the source can produce, in bytes.
    fn max_packet_size(&self) -> u32;
}

impl<S: PacketSource + ?Sized> PacketSource for &S {
    fn read_packets(
        &self,
        start: u64,
        max_packets: usize,
        max_bytes: usize,
        descriptors: &mut [PacketDescriptor],
        data: &mut [u8],
    ) -> io::Result<PacketRun> {
        (**self).read_packets(start, max_packets, max_bytes, descriptors, data)
    }

    fn packet_count(&self) -> u64 {
        (**self).packet_count()
    }

    fn max_packet_size(&self) -> u32 {
        (**self).max_packet_size()
    }
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn read_packets(
        &self,
        start: u64,
        max_packets: usize,
        max_bytes: usize,
        descriptors: &mut [PacketDescriptor],
        data: &mut [u8],
    ) -> io::Result<PacketRun> {
        (**self).read_packets(start, max_packets, max_bytes, descriptors, data)
    }

    fn packet_count(&self) -> u64 {
        (**self).packet_count()
    }

    fn max_packet_size(&self) -> u32 {
        (**self).max_packet_size()
    }
}

impl<S: PacketSource + ?Sized> PacketSource for Arc<S> {
    fn read_packets(
        &self,
        start: u64,
        max_packets: usize,
        max_bytes: usize,
        descriptors: &mut [PacketDescriptor],
        data: &mut [u8],
    ) -> io::Result<PacketRun> {
        (**self).read_packets(start, max_packets, max_bytes, descriptors, data)
    }

    fn packet_count(&self) -> u64 {
        (**self).packet_count()
    }

    fn max_packet_size(&self) -> u32 {
        (**self).max_packet_size()
    }
}

/// Size of a packet as stored in its descriptor.
fn packet_len(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("packet of {len} bytes exceeds the {} byte descriptor limit", u32::MAX),
        )
    })
}

#[derive(Clone, Copy, Debug)]
struct PacketEntry {
    offset: usize,
    len: u32,
    frames: u32,
}

/// Packets held contiguously in memory with a per-packet index.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    bytes: Vec<u8>,
    index: Vec<PacketEntry>,
    max_packet_size: u32,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from whole packets, in order.
    ///
    /// Fails like [`MemorySource::push_packet`] if any packet is too large to index.
    pub fn from_packets<I, P>(packets: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut src = Self::new();
        for p in packets {
            src.push_packet(p.as_ref(), 0)?;
        }
        Ok(src)
    }

    /// Build a source of zero-filled packets with the given sizes.
    pub fn from_sizes(sizes: &[u32]) -> Self {
        let mut src = Self::new();
        for &size in sizes {
            src.push_entry(&vec![0u8; size as usize], size, 0);
        }
        src
    }

    /// Append one packet. `variable_frames` is `0` for constant-duration formats.
    ///
    /// Descriptors carry packet sizes as `u32`, so a packet longer than `u32::MAX` bytes is
    /// rejected with [`io::ErrorKind::InvalidInput`] and the source is left unchanged.
    pub fn push_packet(&mut self, packet: &[u8], variable_frames: u32) -> io::Result<()> {
        let len = packet_len(packet.len())?;
        self.push_entry(packet, len, variable_frames);
        Ok(())
    }

    fn push_entry(&mut self, packet: &[u8], len: u32, frames: u32) {
        self.index.push(PacketEntry {
            offset: self.bytes.len(),
            len,
            frames,
        });
        self.bytes.extend_from_slice(packet);
        self.max_packet_size = self.max_packet_size.max(len);
    }

    /// Number of packets.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of all packet sizes.
    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes of packet `index`.
    pub fn packet(&self, index: usize) -> Option<&[u8]> {
        let entry = self.index.get(index)?;
        self.bytes.get(entry.offset..entry.offset + entry.len as usize)
    }
}

impl PacketSource for MemorySource {
    fn read_packets(
        &self,
        start: u64,
        max_packets: usize,
        max_bytes: usize,
        descriptors: &mut [PacketDescriptor],
        data: &mut [u8],
    ) -> io::Result<PacketRun> {
        let total = self.index.len() as u64;
        if start >= total {
            return Ok(PacketRun {
                packets: 0,
                bytes: 0,
                end_of_source: true,
            });
        }

        let packet_limit = max_packets.min(descriptors.len());
        let byte_limit = max_bytes.min(data.len());
        let mut packets = 0;
        let mut bytes = 0;

        for entry in &self.index[start as usize..] {
            if packets == packet_limit {
                break;
            }
            let len = entry.len as usize;
            if bytes + len > byte_limit {
                break;
            }
            data[bytes..bytes + len].copy_from_slice(&self.bytes[entry.offset..entry.offset + len]);
            descriptors[packets] = PacketDescriptor {
                start_offset: bytes as u64,
                variable_frames: entry.frames,
                data_byte_size: entry.len,
            };
            bytes += len;
            packets += 1;
        }

        Ok(PacketRun {
            packets,
            bytes,
            end_of_source: start + packets as u64 >= total,
        })
    }

    fn packet_count(&self) -> u64 {
        self.index.len() as u64
    }

    fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }
}
