//! Simulated buffer-queue playback engine.
//!
//! Mirrors how an audio queue drives a feeder:
//! - a fixed pool of [`PacketBuffer`]s is allocated up front and primed before playback
//! - a playback thread consumes filled buffers, copying packet bytes into a ring buffer
//! - every buffer it hands back is a buffer-empty event, answered with one `refill`
//!
//! Refills stop once the cursor reports exhaustion (or the cancel flag is set); the engine
//! then waits for every buffer already queued to finish playing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use packet_feeder::{FeederError, PacketBuffer, PacketSource, PlaybackCursor};

const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Knobs for one engine run.
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Queue buffers cycled between feeder and playback.
    pub buffers: usize,
    /// Retries for a refill whose source read fails.
    pub read_retries: u32,
    /// Frames per packet for constant-duration formats, `0` otherwise.
    pub frames_per_packet: u32,
    /// When set, each buffer is held for its duration at this rate.
    pub realtime_rate: Option<u32>,
    /// Stops issuing refills when set.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Totals from one engine run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub buffers_played: u64,
    pub packets: u64,
    pub bytes: u64,
    pub frames: u64,
    /// Source reads that failed and were retried.
    pub read_retries: u64,
    pub cancelled: bool,
}

struct FilledBuffer {
    buffer: PacketBuffer,
    packets: usize,
    bytes: usize,
    frames: u64,
}

#[derive(Default)]
struct PlayedTotals {
    buffers: u64,
    packets: u64,
    bytes: u64,
    frames: u64,
}

#[derive(Default)]
struct FeedTotals {
    read_retries: u64,
    cancelled: bool,
}

/// Fixed-capacity byte ring standing in for a device buffer.
struct RingSink {
    ring: Vec<u8>,
    write_pos: usize,
}

impl RingSink {
    fn new(capacity: usize) -> Self {
        Self {
            ring: vec![0u8; capacity.max(1)],
            write_pos: 0,
        }
    }

    fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let room = self.ring.len() - self.write_pos;
            let n = room.min(bytes.len());
            self.ring[self.write_pos..self.write_pos + n].copy_from_slice(&bytes[..n]);
            self.write_pos = (self.write_pos + n) % self.ring.len();
            bytes = &bytes[n..];
        }
    }
}

/// Play every remaining packet of `cursor` through a simulated queue.
///
/// Configuration errors abort before the first buffer is primed. Source read failures are
/// retried up to `read_retries` times per refill before the run fails.
pub fn run<S: PacketSource>(cursor: &mut PlaybackCursor<S>, opts: &EngineOptions) -> Result<EngineReport> {
    cursor
        .check_source_fits()
        .context("refill budgets do not fit source")?;

    let cfg = *cursor.config();
    let buffer_count = opts.buffers.max(1);
    let pool: Vec<PacketBuffer> = (0..buffer_count)
        .map(|_| PacketBuffer::for_config(&cfg))
        .collect();

    let (filled_tx, filled_rx) = bounded::<FilledBuffer>(buffer_count);
    let (empty_tx, empty_rx) = bounded::<PacketBuffer>(buffer_count);

    let ring_capacity = cfg.max_bytes_per_refill.saturating_mul(buffer_count);
    let realtime_rate = opts.realtime_rate;
    let player = thread::spawn(move || playback_thread(filled_rx, empty_tx, ring_capacity, realtime_rate));

    let fed = feed(cursor, opts, pool, &filled_tx, &empty_rx);

    // Closing the filled channel lets the playback thread drain what is queued and exit.
    drop(filled_tx);
    let played = player
        .join()
        .map_err(|_| anyhow!("playback thread panicked"))?;
    let fed = fed?;

    let report = EngineReport {
        buffers_played: played.buffers,
        packets: played.packets,
        bytes: played.bytes,
        frames: played.frames,
        read_retries: fed.read_retries,
        cancelled: fed.cancelled,
    };
    tracing::info!(
        buffers = report.buffers_played,
        packets = report.packets,
        bytes = report.bytes,
        frames = report.frames,
        cancelled = report.cancelled,
        "playback finished"
    );
    Ok(report)
}

fn feed<S: PacketSource>(
    cursor: &mut PlaybackCursor<S>,
    opts: &EngineOptions,
    pool: Vec<PacketBuffer>,
    filled_tx: &Sender<FilledBuffer>,
    empty_rx: &Receiver<PacketBuffer>,
) -> Result<FeedTotals> {
    let mut totals = FeedTotals::default();
    let cancelled = || {
        opts.cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    };

    let mut in_flight = 0usize;
    for buffer in pool {
        if cursor.is_done() || cancelled() {
            break;
        }
        if fill_and_queue(cursor, opts, buffer, filled_tx, &mut totals)? {
            in_flight += 1;
        }
    }
    tracing::debug!(primed = in_flight, "queue primed");

    while in_flight > 0 && !cursor.is_done() {
        if cancelled() {
            break;
        }
        let buffer = empty_rx
            .recv()
            .map_err(|_| anyhow!("playback thread exited early"))?;
        in_flight -= 1;
        if fill_and_queue(cursor, opts, buffer, filled_tx, &mut totals)? {
            in_flight += 1;
        }
    }

    if cancelled() && !cursor.is_done() {
        tracing::info!(position = cursor.packet_position(), "playback cancelled");
        totals.cancelled = true;
    }
    Ok(totals)
}

/// Refill `buffer` and queue it for playback.
///
/// Returns `false` when the cursor is exhausted and the buffer was not queued.
fn fill_and_queue<S: PacketSource>(
    cursor: &mut PlaybackCursor<S>,
    opts: &EngineOptions,
    mut buffer: PacketBuffer,
    filled_tx: &Sender<FilledBuffer>,
    totals: &mut FeedTotals,
) -> Result<bool> {
    let mut attempts = 0u32;
    let (packets, bytes, frames) = loop {
        match cursor.refill(&mut buffer) {
            Ok(refill) if refill.is_done() => return Ok(false),
            Ok(refill) => {
                let frames = if opts.frames_per_packet > 0 {
                    refill.packets as u64 * opts.frames_per_packet as u64
                } else {
                    refill.variable_frames()
                };
                break (refill.packets, refill.bytes, frames);
            }
            Err(e) if e.is_retryable() && attempts < opts.read_retries => {
                attempts += 1;
                totals.read_retries += 1;
                tracing::warn!(attempt = attempts, "refill failed, retrying: {e}");
                thread::sleep(RETRY_BACKOFF * attempts);
            }
            Err(e @ FeederError::SourceRead { .. }) => {
                return Err(e).context(format!("refill failed after {attempts} retries"));
            }
            Err(e) => return Err(e).context("refill"),
        }
    };

    filled_tx
        .send(FilledBuffer {
            buffer,
            packets,
            bytes,
            frames,
        })
        .map_err(|_| anyhow!("playback thread exited early"))?;
    Ok(true)
}

fn playback_thread(
    filled_rx: Receiver<FilledBuffer>,
    empty_tx: Sender<PacketBuffer>,
    ring_capacity: usize,
    realtime_rate: Option<u32>,
) -> PlayedTotals {
    let mut sink = RingSink::new(ring_capacity);
    let mut totals = PlayedTotals::default();

    for filled in filled_rx.iter() {
        let descriptors = &filled.buffer.descriptors()[..filled.packets];
        let data = &filled.buffer.data()[..filled.bytes];
        for desc in descriptors {
            if let Some(packet) = data.get(desc.range()) {
                sink.write(packet);
            }
        }

        totals.buffers += 1;
        totals.packets += filled.packets as u64;
        totals.bytes += filled.bytes as u64;
        totals.frames += filled.frames;

        if let Some(rate) = realtime_rate.filter(|r| *r > 0) {
            thread::sleep(Duration::from_secs_f64(filled.frames as f64 / rate as f64));
        }

        // The feeder may already have stopped listening; the buffer is simply dropped then.
        let _ = empty_tx.try_send(filled.buffer);
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io;

    use packet_feeder::{FeederConfig, MemorySource, PacketDescriptor, PacketRun};

    fn config(max_packets: usize, max_bytes: usize) -> FeederConfig {
        FeederConfig {
            max_packets_per_refill: max_packets,
            max_bytes_per_refill: max_bytes,
        }
    }

    fn options(buffers: usize) -> EngineOptions {
        EngineOptions {
            buffers,
            read_retries: 3,
            frames_per_packet: 1152,
            realtime_rate: None,
            cancel: None,
        }
    }

    struct FailingSource {
        inner: MemorySource,
        fail_at: u64,
        failures_left: Cell<u32>,
    }

    impl PacketSource for FailingSource {
        fn read_packets(
            &self,
            start: u64,
            max_packets: usize,
            max_bytes: usize,
            descriptors: &mut [PacketDescriptor],
            data: &mut [u8],
        ) -> io::Result<PacketRun> {
            if start == self.fail_at && self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(io::Error::new(io::ErrorKind::Interrupted, "transient"));
            }
            self.inner
                .read_packets(start, max_packets, max_bytes, descriptors, data)
        }

        fn packet_count(&self) -> u64 {
            self.inner.packet_count()
        }

        fn max_packet_size(&self) -> u32 {
            self.inner.max_packet_size()
        }
    }

    #[test]
    fn plays_every_packet_once() {
        let src = MemorySource::from_sizes(&[100; 10]);
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();

        let report = run(&mut cursor, &options(3)).unwrap();
        assert_eq!(report.packets, 10);
        assert_eq!(report.bytes, 1000);
        assert_eq!(report.buffers_played, 3);
        assert_eq!(report.frames, 10 * 1152);
        assert!(!report.cancelled);
        assert!(cursor.is_done());
    }

    #[test]
    fn cycles_buffers_beyond_pool_size() {
        let src = MemorySource::from_sizes(&[64; 500]);
        let mut cursor = PlaybackCursor::new(&src, config(8, 1024)).unwrap();

        let report = run(&mut cursor, &options(2)).unwrap();
        assert_eq!(report.packets, 500);
        assert_eq!(report.bytes, 500 * 64);
        assert_eq!(report.buffers_played, 63);
    }

    #[test]
    fn variable_frames_are_summed_from_descriptors() {
        let mut src = MemorySource::new();
        for frames in [960u32, 480, 960, 1920] {
            src.push_packet(&[0u8; 20], frames).unwrap();
        }
        let mut cursor = PlaybackCursor::new(&src, config(3, 100)).unwrap();
        let opts = EngineOptions {
            frames_per_packet: 0,
            ..options(3)
        };

        let report = run(&mut cursor, &opts).unwrap();
        assert_eq!(report.frames, 960 + 480 + 960 + 1920);
    }

    #[test]
    fn empty_source_plays_nothing() {
        let src = MemorySource::new();
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();

        let report = run(&mut cursor, &options(3)).unwrap();
        assert_eq!(report, EngineReport::default());
        assert!(cursor.is_done());
    }

    #[test]
    fn oversized_packet_fails_before_playback() {
        let src = MemorySource::from_sizes(&[100, 2000]);
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();

        let err = run(&mut cursor, &options(3)).unwrap_err();
        assert!(format!("{err:#}").contains("do not fit"));
        assert_eq!(cursor.packet_position(), 0);
    }

    #[test]
    fn transient_read_failure_is_retried() {
        let src = FailingSource {
            inner: MemorySource::from_sizes(&[100; 10]),
            fail_at: 4,
            failures_left: Cell::new(2),
        };
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();

        let report = run(&mut cursor, &options(3)).unwrap();
        assert_eq!(report.packets, 10);
        assert_eq!(report.read_retries, 2);
    }

    #[test]
    fn persistent_read_failure_fails_the_run() {
        let src = FailingSource {
            inner: MemorySource::from_sizes(&[100; 10]),
            fail_at: 4,
            failures_left: Cell::new(u32::MAX),
        };
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();

        let err = run(&mut cursor, &options(3)).unwrap_err();
        assert!(format!("{err:#}").contains("after 3 retries"));
        assert_eq!(cursor.packet_position(), 4);
    }

    #[test]
    fn preset_cancel_stops_before_priming() {
        let src = MemorySource::from_sizes(&[100; 10]);
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();
        let opts = EngineOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..options(3)
        };

        let report = run(&mut cursor, &opts).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.packets, 0);
        assert_eq!(cursor.packet_position(), 0);
    }

    /// Raises the cancel flag while serving the read at `cancel_at`.
    struct CancellingSource {
        inner: MemorySource,
        cancel_at: u64,
        cancel: Arc<AtomicBool>,
    }

    impl PacketSource for CancellingSource {
        fn read_packets(
            &self,
            start: u64,
            max_packets: usize,
            max_bytes: usize,
            descriptors: &mut [PacketDescriptor],
            data: &mut [u8],
        ) -> io::Result<PacketRun> {
            if start == self.cancel_at {
                self.cancel.store(true, Ordering::Relaxed);
            }
            self.inner
                .read_packets(start, max_packets, max_bytes, descriptors, data)
        }

        fn packet_count(&self) -> u64 {
            self.inner.packet_count()
        }

        fn max_packet_size(&self) -> u32 {
            self.inner.max_packet_size()
        }
    }

    #[test]
    fn cancel_mid_run_drains_queued_buffers_and_stops_refilling() {
        let cancel = Arc::new(AtomicBool::new(false));
        let src = CancellingSource {
            inner: MemorySource::from_sizes(&[100; 40]),
            cancel_at: 12,
            cancel: cancel.clone(),
        };
        let mut cursor = PlaybackCursor::new(&src, config(4, 1000)).unwrap();
        let opts = EngineOptions {
            frames_per_packet: 1,
            cancel: Some(cancel),
            ..options(2)
        };

        let report = run(&mut cursor, &opts).unwrap();
        assert_eq!(
            report,
            EngineReport {
                buffers_played: 4,
                packets: 16,
                bytes: 1600,
                frames: 16,
                read_retries: 0,
                cancelled: true,
            }
        );
        assert_eq!(cursor.packet_position(), 16);
        assert!(!cursor.is_done());
    }

    #[test]
    fn ring_sink_wraps_around() {
        let mut sink = RingSink::new(4);
        sink.write(&[1, 2, 3]);
        sink.write(&[4, 5, 6]);
        assert_eq!(sink.ring, vec![5, 6, 3, 4]);
        assert_eq!(sink.write_pos, 2);
    }
}
