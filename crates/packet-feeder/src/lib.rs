//! Chunked packet feeding for pull-based audio playback.
//!
//! A [`cursor::PlaybackCursor`] walks a packetized [`source::PacketSource`] and, on each
//! buffer-empty event from a playback engine, fills a caller-owned
//! [`descriptor::PacketBuffer`] with the next run of whole packets that fits both refill
//! budgets.

pub mod config;
pub mod cursor;
pub mod demux;
pub mod descriptor;
pub mod error;
pub mod source;

pub use config::{BufferFormat, FeederConfig};
pub use cursor::{CursorStats, PlaybackCursor, PlaybackState};
pub use descriptor::{PacketBuffer, PacketDescriptor, Refill};
pub use error::{ConfigurationError, FeederError, FeederResult};
pub use source::{MemorySource, PacketRun, PacketSource};
