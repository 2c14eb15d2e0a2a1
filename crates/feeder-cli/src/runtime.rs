//! Command runners behind the CLI.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use packet_feeder::demux::{self, SourceFormat};
use packet_feeder::{FeederConfig, PlaybackCursor};

use crate::config::RunSettings;
use crate::engine::{self, EngineOptions, EngineReport};

/// Print the stream format and the refill budgets that would be used.
pub fn run_inspect(path: &Path, settings: &RunSettings) -> Result<()> {
    let (_source, format) = demux::open_file(path)?;
    let cfg = settings.feeder_config(&format)?;
    print!("{}", describe(path, &format, &cfg, settings));
    Ok(())
}

/// Feed `path` through the simulated playback queue until done or interrupted.
pub fn run_play(path: &Path, settings: &RunSettings, realtime: bool) -> Result<()> {
    let (source, format) = demux::open_file(path)?;
    let cfg = settings.feeder_config(&format)?;
    tracing::info!(
        path = %path.display(),
        max_packets_per_refill = cfg.max_packets_per_refill,
        max_bytes_per_refill = cfg.max_bytes_per_refill,
        buffers = settings.buffers,
        "starting playback"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        });
    }

    let mut cursor = PlaybackCursor::new(&source, cfg)?;
    let report = engine::run(
        &mut cursor,
        &EngineOptions {
            buffers: settings.buffers,
            read_retries: settings.read_retries,
            frames_per_packet: format.frames_per_packet,
            realtime_rate: if realtime { format.sample_rate } else { None },
            cancel: Some(cancel),
        },
    )?;

    print!("{}", summarize(&report, format.sample_rate));
    Ok(())
}

fn describe(path: &Path, format: &SourceFormat, cfg: &FeederConfig, settings: &RunSettings) -> String {
    let mut out = String::new();
    out.push_str(&format!("file:               {}\n", path.display()));
    out.push_str(&format!(
        "codec:              {}\n",
        format.codec.as_deref().unwrap_or("unknown")
    ));
    if let Some(rate) = format.sample_rate {
        out.push_str(&format!("sample rate:        {rate} Hz\n"));
    }
    if let Some(channels) = format.channels {
        out.push_str(&format!("channels:           {channels}\n"));
    }
    if let Some(ms) = format.duration_ms() {
        out.push_str(&format!("duration:           {}.{:03} s\n", ms / 1000, ms % 1000));
    }
    out.push_str(&format!("packets:            {}\n", format.total_packets));
    out.push_str(&format!("max packet size:    {} bytes\n", format.max_packet_size));
    if format.frames_per_packet > 0 {
        out.push_str(&format!("frames per packet:  {}\n", format.frames_per_packet));
    } else {
        out.push_str("frames per packet:  variable\n");
    }
    out.push_str(&format!(
        "bit rate:           {}\n",
        if format.variable_bit_rate { "variable" } else { "constant" }
    ));
    if format.magic_cookie_len > 0 {
        out.push_str(&format!("magic cookie:       {} bytes\n", format.magic_cookie_len));
    }
    out.push_str(&format!(
        "refill budget:      {} packets / {} bytes ({} s target)\n",
        cfg.max_packets_per_refill, cfg.max_bytes_per_refill, settings.buffer_seconds
    ));
    out.push_str(&format!("queue buffers:      {}\n", settings.buffers));
    out
}

fn summarize(report: &EngineReport, sample_rate: Option<u32>) -> String {
    let mut out = format!(
        "played {} packets ({} bytes) in {} buffers",
        report.packets, report.bytes, report.buffers_played
    );
    if let Some(rate) = sample_rate.filter(|r| *r > 0) {
        let ms = report.frames.saturating_mul(1000) / rate as u64;
        out.push_str(&format!(", {}.{:03} s of audio", ms / 1000, ms % 1000));
    }
    if report.read_retries > 0 {
        out.push_str(&format!(", {} read retries", report.read_retries));
    }
    if report.cancelled {
        out.push_str(" (cancelled)");
    }
    out.push('\n');
    out
}
