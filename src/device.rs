use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};

/// Synthetic device identifier handed out by the open command.
pub const DEFAULT_DEVICE_ID: u32 = 0xBEEF;
/// Device-id sentinels accepted in place of the synthetic identifier.
pub const DEVICE_ID_ANY: u32 = 0xFFFF_FFFF;
/// Alias recognized by the string interface until an open rebinds it.
pub const DEFAULT_ALIAS: &str = "cdaudio";

/// Control-path state. Only the command dispatcher touches this, behind a
/// mutex; nothing here is visible to the playback driver.
#[derive(Debug)]
pub struct DeviceState {
    pub opened: bool,
    pub alias: String,
    pub time_format: crate::timecode::TimeFormat,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            opened: false,
            alias: DEFAULT_ALIAS.to_string(),
            time_format: crate::timecode::TimeFormat::default(),
        }
    }
}

impl DeviceState {
    /// Close-time reset: alias and time format return to defaults.
    pub fn reset(&mut self) {
        self.alias = DEFAULT_ALIAS.to_string();
        self.time_format = crate::timecode::TimeFormat::default();
    }
}

/// Play range in track slots. `last` is one past the intended final track
/// except when it equals `first` (single-track range).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayRange {
    pub first: usize,
    pub last: usize,
}

impl PlayRange {
    /// Final track the driver actually plays.
    pub fn final_track(&self) -> usize {
        if self.last > self.first {
            self.last - 1
        } else {
            self.first
        }
    }
}

/// Fields shared between the control path and the driver thread. Everything
/// is atomic; the control path never blocks on the driver beyond the
/// cancellation signal, and status queries read last-published values.
#[derive(Debug)]
pub struct PlayerShared {
    /// Cooperative cancellation request, polled at every pump.
    pub cancel: AtomicBool,
    pub playing: AtomicBool,
    pub paused: AtomicBool,
    /// Single notification slot; re-arming overwrites, there is no queue.
    pub notify_armed: AtomicBool,
    pub current_track: AtomicUsize,
    /// Intra-track offset in seconds, published by the driver after each
    /// submitted chunk.
    position: AtomicU32,
    /// Seek applied by the driver before its next pump; -1 = none.
    pending_seek: AtomicI64,
    /// Stop boundary within the range's final track; -1 = unset.
    stop_offset: AtomicI64,
    /// Playback volume in percent, 0..=100.
    pub volume: AtomicU32,
}

impl PlayerShared {
    pub fn new(volume: u32) -> Self {
        Self {
            cancel: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            notify_armed: AtomicBool::new(false),
            current_track: AtomicUsize::new(0),
            position: AtomicU32::new(0),
            pending_seek: AtomicI64::new(-1),
            stop_offset: AtomicI64::new(-1),
            volume: AtomicU32::new(volume.min(100)),
        }
    }

    pub fn position(&self) -> u32 {
        self.position.load(Ordering::Acquire)
    }

    pub fn publish_position(&self, seconds: u32) {
        self.position.store(seconds, Ordering::Release);
    }

    pub fn pending_seek(&self) -> Option<u32> {
        let v = self.pending_seek.load(Ordering::Acquire);
        (v >= 0).then_some(v as u32)
    }

    pub fn set_pending_seek(&self, seconds: u32) {
        self.pending_seek.store(seconds as i64, Ordering::Release);
    }

    pub fn clear_pending_seek(&self) {
        self.pending_seek.store(-1, Ordering::Release);
    }

    /// Consume the pending seek, if any.
    pub fn take_pending_seek(&self) -> Option<u32> {
        let v = self.pending_seek.swap(-1, Ordering::AcqRel);
        (v >= 0).then_some(v as u32)
    }

    pub fn stop_offset(&self) -> Option<u32> {
        let v = self.stop_offset.load(Ordering::Acquire);
        (v >= 0).then_some(v as u32)
    }

    pub fn set_stop_offset(&self, seconds: u32) {
        self.stop_offset.store(seconds as i64, Ordering::Release);
    }

    pub fn clear_stop_offset(&self) {
        self.stop_offset.store(-1, Ordering::Release);
    }

    /// Disarm the notification slot, reporting whether it was armed.
    pub fn disarm_notify(&self) -> bool {
        self.notify_armed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_range_final_track() {
        assert_eq!(PlayRange { first: 1, last: 4 }.final_track(), 3);
        assert_eq!(PlayRange { first: 2, last: 2 }.final_track(), 2);
    }

    #[test]
    fn test_pending_seek_take_clears() {
        let shared = PlayerShared::new(100);
        assert_eq!(shared.take_pending_seek(), None);
        shared.set_pending_seek(12);
        assert_eq!(shared.pending_seek(), Some(12));
        assert_eq!(shared.take_pending_seek(), Some(12));
        assert_eq!(shared.pending_seek(), None);
    }

    #[test]
    fn test_notify_slot_overwrites() {
        let shared = PlayerShared::new(100);
        shared.notify_armed.store(true, Ordering::Release);
        shared.notify_armed.store(true, Ordering::Release);
        assert!(shared.disarm_notify());
        assert!(!shared.disarm_notify());
    }

    #[test]
    fn test_device_state_reset() {
        let mut state = DeviceState::default();
        state.alias = "cd1".to_string();
        state.time_format = crate::timecode::TimeFormat::Tmsf;
        state.opened = true;
        state.reset();
        assert_eq!(state.alias, DEFAULT_ALIAS);
        assert_eq!(state.time_format, crate::timecode::TimeFormat::Msf);
        // reset does not close the device by itself
        assert!(state.opened);
    }
}
