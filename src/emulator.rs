use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};

use crate::audio::{OutputBackend, TrackSource};
use crate::catalog::TrackCatalog;
use crate::config::EmulatorConfig;
use crate::device::{DeviceState, PlayRange, PlayerShared};
use crate::error::EmulatorError;
use crate::notify::{EventSink, NotifyKind, NullSink, NOTIFY_SETTLE};
use crate::player::{DriverContext, PlaybackDriver};
use crate::relay::{CommandRelay, NullRelay};
use crate::timecode::TimeFormat;

/// The virtual CD-audio device. One instance owns the catalog, the device
/// state, and at most one playback driver thread at a time.
pub struct CdEmulator {
    pub(crate) catalog: Arc<TrackCatalog>,
    pub(crate) shared: Arc<PlayerShared>,
    pub(crate) source: Arc<dyn TrackSource>,
    pub(crate) output: Arc<dyn OutputBackend>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) relay: Arc<dyn CommandRelay>,
    pub(crate) device_id: u32,
    pub(crate) accurate_seek: bool,
    pub(crate) full_notify: bool,
    state: Mutex<DeviceState>,
    driver: Mutex<Option<PlaybackDriver>>,
    /// Pending notify request carried from the string interface into the
    /// next structured call, consumed exactly once.
    string_notify: AtomicBool,
    /// Last raw volume word seen by the aux surface, for dedup.
    pub(crate) aux_last_volume: Mutex<Option<u32>>,
}

/// Read-only snapshot of the externally observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorStatus {
    pub opened: bool,
    pub alias: String,
    pub time_format: TimeFormat,
    pub current_track: usize,
    pub playing: bool,
    pub paused: bool,
    pub pending_seek: Option<u32>,
    pub position: u32,
    pub volume: u32,
}

impl CdEmulator {
    pub fn builder(config: EmulatorConfig) -> EmulatorBuilder {
        EmulatorBuilder::new(config)
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn status(&self) -> EmulatorStatus {
        let state = self.state();
        EmulatorStatus {
            opened: state.opened,
            alias: state.alias.clone(),
            time_format: state.time_format,
            current_track: self.shared.current_track.load(Ordering::Acquire),
            playing: self.shared.playing.load(Ordering::Acquire),
            paused: self.shared.paused.load(Ordering::Acquire),
            pending_seek: self.shared.pending_seek(),
            position: self.shared.position(),
            volume: self.shared.volume.load(Ordering::Acquire),
        }
    }

    /// Halt any playback and release the driver thread. Called by the
    /// console binary on shutdown; commands do this on their own.
    pub fn shutdown(&self) {
        self.halt_driver();
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_volume(&self, percent: u32) {
        self.shared.volume.store(percent.min(100), Ordering::Release);
    }

    /// Fire Aborted for an armed notification, disarming the slot.
    pub(crate) fn abort_armed(&self) {
        if self.shared.disarm_notify() {
            self.sink.post(NotifyKind::Aborted, self.device_id);
        }
    }

    /// Immediate success acknowledgment for a notify-requesting command.
    /// Only fires in full-notification mode on an opened device; disarms
    /// the slot so the driver does not deliver a second notification.
    pub(crate) fn ack_notify(&self, requested: bool) {
        if !requested {
            return;
        }
        let opened = self.state().opened;
        if self.full_notify && opened {
            self.shared.disarm_notify();
            self.post_settled(NotifyKind::Successful);
        }
    }

    /// Post a notification followed by the fixed settle delay that callers
    /// in the wild depend on before they re-poll state.
    pub(crate) fn post_settled(&self, kind: NotifyKind) {
        self.sink.post(kind, self.device_id);
        std::thread::sleep(NOTIFY_SETTLE);
    }

    pub(crate) fn arm_string_notify(&self) {
        self.string_notify.store(true, Ordering::Release);
    }

    pub(crate) fn take_string_notify(&self) -> bool {
        self.string_notify.swap(false, Ordering::AcqRel)
    }

    /// Cancel the driver thread cooperatively and wait boundedly for it.
    pub(crate) fn halt_driver(&self) {
        self.shared.playing.store(false, Ordering::Release);
        let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(driver) = slot.take() {
            self.shared.cancel.store(true, Ordering::Release);
            driver.join_bounded();
            self.shared.cancel.store(false, Ordering::Release);
        }
    }

    /// Spawn a driver over the resolved range. The caller has already
    /// halted the previous driver and checked output availability.
    pub(crate) fn start_driver(&self, range: PlayRange) -> Result<(), EmulatorError> {
        let ctx = DriverContext {
            catalog: Arc::clone(&self.catalog),
            shared: Arc::clone(&self.shared),
            source: Arc::clone(&self.source),
            output: Arc::clone(&self.output),
            sink: Arc::clone(&self.sink),
            device_id: self.device_id,
            range,
        };
        self.shared.cancel.store(false, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
        let driver = PlaybackDriver::spawn(ctx).map_err(|e| {
            self.shared.playing.store(false, Ordering::Release);
            EmulatorError::File(e)
        })?;
        let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(driver);
        debug!("driver started over tracks {}..{}", range.first, range.last);
        Ok(())
    }
}

/// Builder wiring the emulator's collaborators; tests substitute mock
/// source, output, and sink implementations.
pub struct EmulatorBuilder {
    config: EmulatorConfig,
    catalog: Option<TrackCatalog>,
    source: Option<Arc<dyn TrackSource>>,
    output: Option<Arc<dyn OutputBackend>>,
    sink: Option<Arc<dyn EventSink>>,
    relay: Option<Arc<dyn CommandRelay>>,
}

impl EmulatorBuilder {
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            config,
            catalog: None,
            source: None,
            output: None,
            sink: None,
            relay: None,
        }
    }

    /// Use a prebuilt catalog instead of scanning the music directory.
    pub fn catalog(mut self, catalog: TrackCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn source(mut self, source: Arc<dyn TrackSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn output(mut self, output: Arc<dyn OutputBackend>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn relay(mut self, relay: Arc<dyn CommandRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn build(self) -> CdEmulator {
        let source: Arc<dyn TrackSource> = self
            .source
            .unwrap_or_else(|| Arc::new(crate::audio::SymphoniaSource));
        let catalog = self
            .catalog
            .unwrap_or_else(|| TrackCatalog::scan(&self.config.music_dir, source.as_ref()));

        info!(
            "emulator ready: device id {:#x}, {} tracks",
            self.config.device_id,
            catalog.num_tracks()
        );

        let shared = PlayerShared::new(self.config.volume);
        // Callers expect a current track of 1 before the first seek or play.
        shared.current_track.store(1, Ordering::Release);

        CdEmulator {
            catalog: Arc::new(catalog),
            shared: Arc::new(shared),
            source,
            output: self
                .output
                .unwrap_or_else(|| Arc::new(crate::audio::CpalBackend)),
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            relay: self.relay.unwrap_or_else(|| Arc::new(NullRelay)),
            device_id: self.config.device_id,
            accurate_seek: self.config.accurate_seek,
            full_notify: self.config.full_notify,
            state: Mutex::new(DeviceState::default()),
            driver: Mutex::new(None),
            string_notify: AtomicBool::new(false),
            aux_last_volume: Mutex::new(None),
        }
    }
}

impl Drop for CdEmulator {
    fn drop(&mut self) {
        self.halt_driver();
    }
}
