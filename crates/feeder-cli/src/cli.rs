//! Command-line interface definitions.
//!
//! Only the `clap` surface lives here; see `config` for how flags merge with file values.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "packet-feeder", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML file with defaults for the options below
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Audio held by one queue buffer, in seconds
    #[arg(long, global = true)]
    pub buffer_seconds: Option<f64>,

    /// Number of queue buffers cycled between feeder and playback
    #[arg(long, global = true)]
    pub buffers: Option<usize>,

    /// Override the planned byte budget per refill
    #[arg(long, global = true)]
    pub max_bytes: Option<usize>,

    /// Override the planned packet budget per refill
    #[arg(long, global = true)]
    pub max_packets: Option<usize>,

    /// Retries for a refill whose source read fails
    #[arg(long, global = true)]
    pub read_retries: Option<u32>,

    /// Hold each buffer for its audio duration, as a device would
    #[arg(long, global = true)]
    pub realtime: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the stream format and the planned refill budgets
    Inspect {
        /// Path to audio file
        path: PathBuf,
    },

    /// Feed the file's packets through a simulated playback queue
    Play {
        /// Path to audio file
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_global_overrides() {
        let args = Args::try_parse_from([
            "packet-feeder",
            "play",
            "track.flac",
            "--realtime",
            "--buffers",
            "4",
            "--max-bytes",
            "32768",
        ])
        .unwrap();
        assert_eq!(args.buffers, Some(4));
        assert_eq!(args.max_bytes, Some(32_768));
        assert!(args.max_packets.is_none());
        assert!(args.realtime);
        match args.cmd {
            Command::Play { path } => {
                assert_eq!(path, PathBuf::from("track.flac"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn realtime_is_accepted_before_the_subcommand() {
        let args =
            Args::try_parse_from(["packet-feeder", "--realtime", "play", "track.flac"]).unwrap();
        assert!(args.realtime);

        let args = Args::try_parse_from(["packet-feeder", "inspect", "track.flac"]).unwrap();
        assert!(!args.realtime);
    }

    #[test]
    fn inspect_requires_path() {
        assert!(Args::try_parse_from(["packet-feeder", "inspect"]).is_err());
    }
}
