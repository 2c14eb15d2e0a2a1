//! Configuration loading and resolution.
//!
//! Settings come from three layers, highest priority first: command-line flags, an optional
//! TOML file, then built-in defaults.

use std::path::Path;

use anyhow::{Context, Result};
use packet_feeder::FeederConfig;
use packet_feeder::demux::SourceFormat;
use serde::Deserialize;

use crate::cli::Args;

pub const DEFAULT_BUFFERS: usize = 3;
pub const DEFAULT_BUFFER_SECONDS: f64 = 0.5;
pub const DEFAULT_READ_RETRIES: u32 = 3;

/// File configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Number of queue buffers.
    pub buffers: Option<usize>,
    /// Audio per buffer, in seconds.
    pub buffer_seconds: Option<f64>,
    /// Retries for transient read failures.
    pub read_retries: Option<u32>,
    /// Explicit refill budgets.
    pub feeder: Option<FeederOverrides>,
}

/// Budget overrides; unset fields keep the planned value.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeederOverrides {
    pub max_packets_per_refill: Option<usize>,
    pub max_bytes_per_refill: Option<usize>,
}

impl CliConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<CliConfig>(raw)?)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub buffers: usize,
    pub buffer_seconds: f64,
    pub read_retries: u32,
    pub overrides: FeederOverrides,
}

impl RunSettings {
    /// Merge flags over file values over defaults.
    pub fn resolve(args: &Args, file: Option<&CliConfig>) -> Self {
        let file_overrides = file.and_then(|f| f.feeder).unwrap_or_default();
        Self {
            buffers: args
                .buffers
                .or(file.and_then(|f| f.buffers))
                .unwrap_or(DEFAULT_BUFFERS)
                .max(1),
            buffer_seconds: args
                .buffer_seconds
                .or(file.and_then(|f| f.buffer_seconds))
                .unwrap_or(DEFAULT_BUFFER_SECONDS),
            read_retries: args
                .read_retries
                .or(file.and_then(|f| f.read_retries))
                .unwrap_or(DEFAULT_READ_RETRIES),
            overrides: FeederOverrides {
                max_packets_per_refill: args
                    .max_packets
                    .or(file_overrides.max_packets_per_refill),
                max_bytes_per_refill: args.max_bytes.or(file_overrides.max_bytes_per_refill),
            },
        }
    }

    /// Plan budgets for `format`, then apply explicit overrides.
    pub fn feeder_config(&self, format: &SourceFormat) -> Result<FeederConfig> {
        let mut cfg = match FeederConfig::for_duration(&format.buffer_format(), self.buffer_seconds)
        {
            Ok(cfg) => cfg,
            // An empty source has no packet size to plan around.
            Err(e) if format.total_packets == 0 => {
                tracing::debug!("using default budgets: {e}");
                FeederConfig::default()
            }
            Err(e) => return Err(e).context("plan refill budgets"),
        };
        if let Some(packets) = self.overrides.max_packets_per_refill {
            cfg.max_packets_per_refill = packets;
        }
        if let Some(bytes) = self.overrides.max_bytes_per_refill {
            cfg.max_bytes_per_refill = bytes;
        }
        cfg.validate().context("refill budgets")?;
        Ok(cfg)
    }
}
