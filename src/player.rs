use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::audio::{AudioStream, OutputBackend, OutputDevice, TrackSource};
use crate::catalog::TrackCatalog;
use crate::device::{PlayRange, PlayerShared};
use crate::notify::{EventSink, NotifyKind};

/// Chunk size pumped per iteration, roughly 250 ms of audio.
pub const CHUNK_DIVISOR: u32 = 4;
/// Maximum buffers in flight at the output before the pump blocks.
pub const RING_CAPACITY: usize = 3;
/// How long the control path waits for a cancelled driver to finish
/// before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Everything the driver thread owns or shares.
pub struct DriverContext {
    pub catalog: Arc<TrackCatalog>,
    pub shared: Arc<PlayerShared>,
    pub source: Arc<dyn TrackSource>,
    pub output: Arc<dyn OutputBackend>,
    pub sink: Arc<dyn EventSink>,
    pub device_id: u32,
    pub range: PlayRange,
}

/// Handle to the single playback worker thread.
pub struct PlaybackDriver {
    handle: JoinHandle<()>,
}

impl PlaybackDriver {
    pub fn spawn(ctx: DriverContext) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("cdaudio-player".to_string())
            .spawn(move || run(ctx))?;
        Ok(Self { handle })
    }

    /// Wait boundedly for the thread after a cancel request. A driver that
    /// outlives the timeout is detached; it tears down its own resources
    /// at the next cancellation poll.
    pub fn join_bounded(self) {
        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("playback driver did not stop in time, detaching");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = self.handle.join();
    }
}

enum PumpOutcome {
    /// Track finished; move on within the range.
    Advance,
    /// Driver must exit now (cancelled or boundary reached).
    Halt,
}

fn run(ctx: DriverContext) {
    let final_track = ctx.range.final_track().min(ctx.catalog.last_track());
    let mut current = ctx.range.first.max(ctx.catalog.first_track());

    debug!("driver range {}..={}", current, final_track);

    while current <= final_track {
        if ctx.shared.cancel.load(Ordering::Acquire) {
            return;
        }
        ctx.shared.current_track.store(current, Ordering::Release);
        ctx.shared.publish_position(0);

        let path = match ctx.catalog.track(current).and_then(|t| t.path.clone()) {
            Some(p) => p,
            None => {
                // Data slot inside the range.
                current += 1;
                continue;
            }
        };

        let mut stream = match ctx.source.open(&path) {
            Ok(s) => s,
            Err(e) => {
                // Treated as an already-finished track so the range keeps
                // advancing past a damaged file.
                info!("cannot open track {}: {}", current, e);
                current += 1;
                continue;
            }
        };

        let mut out = match ctx.output.open(stream.spec()) {
            Ok(o) => o,
            Err(e) => {
                info!("cannot open output for track {}: {}", current, e);
                current += 1;
                continue;
            }
        };

        match pump_track(&ctx, current, final_track, stream.as_mut(), out.as_mut()) {
            PumpOutcome::Advance => current += 1,
            PumpOutcome::Halt => return,
        }
    }

    ctx.shared.playing.store(false, Ordering::Release);
    if !ctx.shared.paused.load(Ordering::Acquire) && ctx.shared.disarm_notify() {
        ctx.sink.post(NotifyKind::Successful, ctx.device_id);
    }
    debug!("driver finished range");
}

fn pump_track(
    ctx: &DriverContext,
    current: usize,
    final_track: usize,
    stream: &mut dyn AudioStream,
    out: &mut dyn OutputDevice,
) -> PumpOutcome {
    let frames_per_chunk = (stream.spec().sample_rate / CHUNK_DIVISOR).max(1) as usize;

    loop {
        if ctx.shared.cancel.load(Ordering::Acquire) {
            out.reset();
            return PumpOutcome::Halt;
        }

        if let Some(offset) = ctx.shared.take_pending_seek() {
            if let Err(e) = stream.seek(offset) {
                info!("seek to {}s failed on track {}: {}", offset, current, e);
                return PumpOutcome::Advance;
            }
            ctx.shared.publish_position(stream.tell());
        }

        // The stop boundary only applies to the range's final track.
        if current == final_track {
            if let Some(stop) = ctx.shared.stop_offset() {
                if stream.tell() >= stop {
                    ctx.shared.set_pending_seek(stream.tell());
                    ctx.shared.clear_stop_offset();
                    ctx.shared.paused.store(true, Ordering::Release);
                    ctx.shared.playing.store(false, Ordering::Release);
                    if ctx.shared.disarm_notify() {
                        ctx.sink.post(NotifyKind::Successful, ctx.device_id);
                    }
                    debug!("stop boundary reached at {}s in track {}", stop, current);
                    return PumpOutcome::Halt;
                }
            }
        }

        match stream.read_chunk(frames_per_chunk) {
            Ok(Some(mut pcm)) => {
                apply_volume(&mut pcm, ctx.shared.volume.load(Ordering::Acquire));
                while out.in_flight() >= RING_CAPACITY {
                    if ctx.shared.cancel.load(Ordering::Acquire) {
                        out.reset();
                        return PumpOutcome::Halt;
                    }
                    out.wait_done(WAIT_SLICE);
                }
                if out.submit(pcm).is_err() {
                    warn!("output rejected buffer on track {}", current);
                    return PumpOutcome::Advance;
                }
                ctx.shared.publish_position(stream.tell());
            }
            Ok(None) => {
                // Drain what is still queued before releasing the device.
                while out.in_flight() > 0 && !ctx.shared.cancel.load(Ordering::Acquire) {
                    out.wait_done(WAIT_SLICE);
                }
                return PumpOutcome::Advance;
            }
            Err(e) => {
                // A damaged source behaves like a track that just ended.
                info!("decode error on track {}: {}", current, e);
                return PumpOutcome::Advance;
            }
        }
    }
}

/// Linear volume scale in percent, matching the legacy mixer exactly.
fn apply_volume(pcm: &mut [i16], percent: u32) {
    if percent >= 100 {
        return;
    }
    for sample in pcm.iter_mut() {
        *sample = (*sample as i32 * percent as i32 / 100) as i16;
    }
}
