//! Container demuxing into an in-memory packet source.
//!
//! Uses Symphonia to:
//! - detect the input container format
//! - read (not decode) every packet of the default track
//! - index the encoded packets into a [`MemorySource`] the feeder can walk

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::BufferFormat;
use crate::source::{MemorySource, PacketSource};

/// Stream properties captured while demuxing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceFormat {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    /// Frames per packet when every packet but the last has the same duration, else `0`.
    pub frames_per_packet: u32,
    /// Largest packet in bytes.
    pub max_packet_size: u32,
    pub total_packets: u64,
    /// Total frames, from the container when known, else summed from packets.
    pub total_frames: Option<u64>,
    /// Size of the codec's out-of-band setup data (magic cookie), `0` if none.
    pub magic_cookie_len: usize,
    /// Packets differ in size.
    pub variable_bit_rate: bool,
}

impl SourceFormat {
    /// Inputs for [`crate::config::FeederConfig::for_duration`].
    pub fn buffer_format(&self) -> BufferFormat {
        BufferFormat {
            sample_rate: self.sample_rate.unwrap_or(0),
            frames_per_packet: self.frames_per_packet,
            max_packet_size: self.max_packet_size,
        }
    }

    /// Total duration in milliseconds when known.
    pub fn duration_ms(&self) -> Option<u64> {
        let frames = self.total_frames?;
        let rate = self.sample_rate? as u64;
        if rate == 0 {
            return None;
        }
        Some(frames.saturating_mul(1000) / rate)
    }
}

/// Demux `path` into memory.
pub fn open_file(path: &Path) -> Result<(MemorySource, SourceFormat)> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    open_media_source(Box::new(file), hint).with_context(|| format!("demux {:?}", path))
}

/// Demux an arbitrary Symphonia [`MediaSource`] into memory.
///
/// Only packets of the default track are kept.
pub fn open_media_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
) -> Result<(MemorySource, SourceFormat)> {
    let mss = MediaSourceStream::new(source, Default::default());

    let detected = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = detected.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let params: CodecParameters = track.codec_params.clone();

    let mut packets: Vec<(Box<[u8]>, u64)> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(e) => match read_stop(&e) {
                Some(ReadStop::EndOfStream) => break,
                Some(ReadStop::ResetRequired) => {
                    tracing::warn!(
                        packets = packets.len(),
                        "stream reset required; keeping packets read so far"
                    );
                    break;
                }
                None => return Err(e).context("read packet"),
            },
        };
        if packet.track_id() != track_id {
            continue;
        }
        packets.push((packet.data, packet.dur));
    }

    let frames_per_packet = uniform_packet_frames(&packets);
    let variable_bit_rate = !uniform_packet_sizes(&packets);

    let mut src = MemorySource::new();
    for (data, dur) in &packets {
        let variable_frames = if frames_per_packet > 0 {
            0
        } else {
            u32::try_from(*dur).unwrap_or(u32::MAX)
        };
        src.push_packet(data, variable_frames)
            .context("index packet")?;
    }

    let summed_frames: u64 = packets.iter().map(|(_, dur)| *dur).sum();
    let source_format = SourceFormat {
        codec: codec_name_from_params(&params),
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
        frames_per_packet,
        max_packet_size: src.max_packet_size(),
        total_packets: src.packet_count(),
        total_frames: params.n_frames.or(Some(summed_frames)),
        magic_cookie_len: params.extra_data.as_ref().map(|d| d.len()).unwrap_or(0),
        variable_bit_rate,
    };
    tracing::info!(
        codec = source_format.codec.as_deref().unwrap_or("unknown"),
        packets = source_format.total_packets,
        bytes = src.total_bytes(),
        max_packet_size = source_format.max_packet_size,
        frames_per_packet,
        "demuxed source"
    );

    Ok((src, source_format))
}

/// Why the packet loop stopped without failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadStop {
    EndOfStream,
    /// Track list changed mid-stream (chained streams); later packets are not read.
    ResetRequired,
}

fn read_stop(err: &SymphoniaError) -> Option<ReadStop> {
    match err {
        SymphoniaError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Some(ReadStop::EndOfStream)
        }
        SymphoniaError::ResetRequired => Some(ReadStop::ResetRequired),
        _ => None,
    }
}

/// Shared packet duration, ignoring a shorter final packet; `0` if durations vary.
fn uniform_packet_frames(packets: &[(Box<[u8]>, u64)]) -> u32 {
    let Some(((_, first), rest)) = packets.split_first() else {
        return 0;
    };
    let body = &rest[..rest.len().saturating_sub(1)];
    let last_ok = rest.last().map(|(_, dur)| dur <= first).unwrap_or(true);
    if *first > 0 && last_ok && body.iter().all(|(_, dur)| dur == first) {
        u32::try_from(*first).unwrap_or(0)
    } else {
        0
    }
}

/// Whether every packet but the last has the same size.
fn uniform_packet_sizes(packets: &[(Box<[u8]>, u64)]) -> bool {
    let body = &packets[..packets.len().saturating_sub(1)];
    body.windows(2).all(|w| w[0].0.len() == w[1].0.len())
}

/// Best-effort codec label for logs and reports.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
