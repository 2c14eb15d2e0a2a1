//! packet-feeder: demux an audio file and drive its packets through a simulated playback
//! queue using the chunked refill feeder.
//!
//! ## Commands
//! - `inspect`: print the stream format and the refill budgets planned for it.
//! - `play`: prime a pool of queue buffers, then refill each one as playback empties it
//!   until the source is exhausted or ctrl-c is pressed.

use anyhow::Result;
use clap::Parser;
use feeder_cli::cli::{Args, Command};
use feeder_cli::config::{CliConfig, RunSettings};
use feeder_cli::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,packet_feeder=info,feeder_cli=info")
        }))
        .init();

    let file_config = args.config.as_deref().map(CliConfig::load).transpose()?;
    let settings = RunSettings::resolve(&args, file_config.as_ref());

    match &args.cmd {
        Command::Inspect { path } => runtime::run_inspect(path, &settings)?,
        Command::Play { path } => runtime::run_play(path, &settings, args.realtime)?,
    }

    Ok(())
}
