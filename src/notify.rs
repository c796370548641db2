use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome kinds carried by the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Successful,
    Aborted,
}

impl NotifyKind {
    /// Raw value of the legacy notification message parameter.
    pub fn as_raw(self) -> u32 {
        match self {
            NotifyKind::Successful => 1,
            NotifyKind::Aborted => 4,
        }
    }
}

/// Settle delay after an immediate success notification. Callers in the
/// wild poll right after the notification and rely on this delay existing.
pub const NOTIFY_SETTLE: Duration = Duration::from_millis(50);

/// One-way, fire-and-forget notification delivery.
pub trait EventSink: Send + Sync {
    fn post(&self, kind: NotifyKind, device_id: u32);
}

/// Sink that drops every notification.
pub struct NullSink;

impl EventSink for NullSink {
    fn post(&self, _kind: NotifyKind, _device_id: u32) {}
}

/// Sink that forwards notifications over an mpsc channel, for the console
/// binary and for tests.
pub struct ChannelSink {
    tx: Mutex<Sender<(NotifyKind, u32)>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<(NotifyKind, u32)>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl EventSink for ChannelSink {
    fn post(&self, kind: NotifyKind, device_id: u32) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send((kind, device_id));
        }
    }
}
