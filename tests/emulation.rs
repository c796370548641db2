//! End-to-end scenarios through the structured and string interfaces,
//! with mock decode and output collaborators standing in for real media.

use std::path::Path;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cdaudio_emu::audio::{
    AudioStream, OutputBackend, OutputDevice, StreamSpec, TrackSource,
};
use cdaudio_emu::catalog::TrackCatalog;
use cdaudio_emu::command::{code, mode, result, status_item, CommandFlags, ParamBlock};
use cdaudio_emu::config::EmulatorConfig;
use cdaudio_emu::error::{DecodeError, OutputError};
use cdaudio_emu::notify::{ChannelSink, NotifyKind};
use cdaudio_emu::timecode;
use cdaudio_emu::CdEmulator;

const RATE: u32 = 8;

struct MockStream {
    length: u32,
    pos_frames: u64,
    seeks: Arc<Mutex<Vec<(usize, u32)>>>,
    slot: usize,
    live: Arc<AtomicIsize>,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioStream for MockStream {
    fn spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: RATE,
            channels: 2,
            bits_per_sample: 16,
        }
    }

    fn read_chunk(&mut self, max_frames: usize) -> Result<Option<Vec<i16>>, DecodeError> {
        // Keep mock playback fast but observable from the control thread.
        thread::sleep(Duration::from_millis(1));
        let total = self.length as u64 * RATE as u64;
        if self.pos_frames >= total {
            return Ok(None);
        }
        let frames = (total - self.pos_frames).min(max_frames as u64) as usize;
        self.pos_frames += frames as u64;
        Ok(Some(vec![8000i16; frames * 2]))
    }

    fn seek(&mut self, seconds: u32) -> Result<(), DecodeError> {
        self.seeks.lock().unwrap().push((self.slot, seconds));
        self.pos_frames = seconds as u64 * RATE as u64;
        Ok(())
    }

    fn tell(&self) -> u32 {
        (self.pos_frames / RATE as u64) as u32
    }
}

struct MockSource {
    lengths: Vec<u32>,
    seeks: Arc<Mutex<Vec<(usize, u32)>>>,
    opened: Arc<Mutex<Vec<usize>>>,
    live_streams: Arc<AtomicIsize>,
}

impl MockSource {
    fn slot_of(path: &Path) -> usize {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.trim_start_matches("Track").parse().ok())
            .unwrap_or(0)
    }
}

impl TrackSource for MockSource {
    fn probe_seconds(&self, path: &Path) -> u32 {
        self.lengths
            .get(Self::slot_of(path).wrapping_sub(1))
            .copied()
            .unwrap_or(0)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn AudioStream>, DecodeError> {
        let slot = Self::slot_of(path);
        let length = self.lengths.get(slot.wrapping_sub(1)).copied().unwrap_or(0);
        if length == 0 {
            return Err(DecodeError::OpenFailed {
                path: path.display().to_string(),
            });
        }
        self.opened.lock().unwrap().push(slot);
        self.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            length,
            pos_frames: 0,
            seeks: self.seeks.clone(),
            slot,
            live: self.live_streams.clone(),
        }))
    }
}

struct MockOutput {
    live: Arc<AtomicIsize>,
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl OutputDevice for MockOutput {
    fn submit(&mut self, _pcm: Vec<i16>) -> Result<(), OutputError> {
        Ok(())
    }
    fn in_flight(&self) -> usize {
        0
    }
    fn wait_done(&mut self, _timeout: Duration) {}
    fn reset(&mut self) {}
}

struct MockBackend {
    available: bool,
    opens: Arc<AtomicUsize>,
    live_outputs: Arc<AtomicIsize>,
}

impl OutputBackend for MockBackend {
    fn available(&self) -> bool {
        self.available
    }

    fn open(&self, _spec: StreamSpec) -> Result<Box<dyn OutputDevice>, OutputError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live_outputs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockOutput {
            live: self.live_outputs.clone(),
        }))
    }
}

struct Fixture {
    emu: CdEmulator,
    events: Receiver<(NotifyKind, u32)>,
    seeks: Arc<Mutex<Vec<(usize, u32)>>>,
    opened: Arc<Mutex<Vec<usize>>>,
    live_streams: Arc<AtomicIsize>,
    live_outputs: Arc<AtomicIsize>,
}

fn fixture_with(lengths: &[u32], config: EmulatorConfig, output_available: bool) -> Fixture {
    let seeks = Arc::new(Mutex::new(Vec::new()));
    let opened = Arc::new(Mutex::new(Vec::new()));
    let live_streams = Arc::new(AtomicIsize::new(0));
    let live_outputs = Arc::new(AtomicIsize::new(0));
    let (sink, events) = ChannelSink::new();

    let emu = CdEmulator::builder(config)
        .catalog(TrackCatalog::from_lengths(lengths))
        .source(Arc::new(MockSource {
            lengths: lengths.to_vec(),
            seeks: seeks.clone(),
            opened: opened.clone(),
            live_streams: live_streams.clone(),
        }))
        .output(Arc::new(MockBackend {
            available: output_available,
            opens: Arc::new(AtomicUsize::new(0)),
            live_outputs: live_outputs.clone(),
        }))
        .sink(Arc::new(sink))
        .build();

    Fixture {
        emu,
        events,
        seeks,
        opened,
        live_streams,
        live_outputs,
    }
}

fn fixture(lengths: &[u32]) -> Fixture {
    fixture_with(lengths, EmulatorConfig::default(), true)
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn status_of(emu: &CdEmulator, item: u32) -> u32 {
    let mut params = ParamBlock {
        item,
        ..Default::default()
    };
    let rc = emu.send_command(
        emu.device_id(),
        code::STATUS,
        CommandFlags::STATUS_ITEM,
        &mut params,
    );
    assert_eq!(rc, result::OK);
    params.ret
}

#[test]
fn number_of_tracks_skips_data_slot() {
    let f = fixture(&[30, 0, 45]);
    assert_eq!(status_of(&f.emu, status_item::NUMBER_OF_TRACKS), 2);
}

#[test]
fn play_range_ending_on_data_slot_advances_and_notifies_once() {
    let f = fixture(&[4, 0, 5]);
    let mut params = ParamBlock {
        from: timecode::make_tmsf(1, 0, 0, 0),
        to: timecode::make_tmsf(2, 0, 0, 0),
        ..Default::default()
    };
    {
        let mut state = ParamBlock::default();
        state.time_format = timecode::FORMAT_TMSF;
        f.emu.send_command(
            f.emu.device_id(),
            code::SET,
            CommandFlags::SET_TIME_FORMAT,
            &mut state,
        );
    }

    let rc = f.emu.send_command(
        f.emu.device_id(),
        code::PLAY,
        CommandFlags::NOTIFY | CommandFlags::FROM | CommandFlags::TO,
        &mut params,
    );
    assert_eq!(rc, result::OK);

    // Track 1 plays out, the data slot is skipped, and the boundary at the
    // start of track 3 ends the range.
    let (kind, _) = f.events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(kind, NotifyKind::Successful);

    assert!(wait_until(|| !f.emu.status().playing, Duration::from_secs(2)));
    let status = f.emu.status();
    assert_eq!(status.current_track, 3);
    assert!(status.paused);

    // Never a second notification.
    thread::sleep(Duration::from_millis(50));
    assert!(f.events.try_recv().is_err());
}

#[test]
fn play_to_track_boundary_excludes_named_track() {
    let f = fixture(&[5, 5, 5]);

    let mut set = ParamBlock {
        time_format: timecode::FORMAT_TMSF,
        ..Default::default()
    };
    f.emu.send_command(
        f.emu.device_id(),
        code::SET,
        CommandFlags::SET_TIME_FORMAT,
        &mut set,
    );

    // "to 2" with no minute or second names the boundary at the start of
    // track 2; track 2 itself must not be played.
    let mut play = ParamBlock {
        from: timecode::make_tmsf(1, 0, 0, 0),
        to: timecode::make_tmsf(2, 0, 0, 0),
        ..Default::default()
    };
    let rc = f.emu.send_command(
        f.emu.device_id(),
        code::PLAY,
        CommandFlags::NOTIFY | CommandFlags::FROM | CommandFlags::TO,
        &mut play,
    );
    assert_eq!(rc, result::OK);

    let (kind, _) = f.events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(kind, NotifyKind::Successful);
    assert!(wait_until(|| !f.emu.status().playing, Duration::from_secs(2)));

    assert_eq!(*f.opened.lock().unwrap(), vec![1]);
    assert_eq!(f.emu.status().current_track, 1);
}

#[test]
fn play_from_zero_milliseconds_starts_at_first_track() {
    let f = fixture(&[30, 45]);

    let mut set = ParamBlock {
        time_format: timecode::FORMAT_MILLISECONDS,
        ..Default::default()
    };
    f.emu.send_command(
        f.emu.device_id(),
        code::SET,
        CommandFlags::SET_TIME_FORMAT,
        &mut set,
    );

    // Position 0 is inside the pregap; it belongs to the first track, not
    // the last one.
    let mut play = ParamBlock::default();
    let rc = f
        .emu
        .send_command(f.emu.device_id(), code::PLAY, CommandFlags::FROM, &mut play);
    assert_eq!(rc, result::OK);

    assert!(wait_until(
        || !f.opened.lock().unwrap().is_empty(),
        Duration::from_secs(2)
    ));
    assert_eq!(f.opened.lock().unwrap()[0], 1);
    assert_eq!(f.emu.status().current_track, 1);

    let mut stop = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);
}

#[test]
fn stop_preserves_resume_offset_across_cycles() {
    let f = fixture(&[30]);

    for _ in 0..3 {
        let mut play = ParamBlock::default();
        f.emu
            .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
        assert!(wait_until(|| f.emu.status().playing, Duration::from_secs(2)));

        // A bare play while playing queues an implicit seek the driver is
        // busy consuming; stopping right after must still leave a resume
        // offset behind.
        f.emu
            .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
        let mut stop = ParamBlock::default();
        f.emu
            .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);

        let status = f.emu.status();
        assert!(status.paused);
        assert!(status.pending_seek.is_some());
    }
}

#[test]
fn seek_then_bare_play_resumes_at_offset() {
    let f = fixture(&[30, 0, 45]);

    let mut set = ParamBlock {
        time_format: timecode::FORMAT_MILLISECONDS,
        ..Default::default()
    };
    f.emu.send_command(
        f.emu.device_id(),
        code::SET,
        CommandFlags::SET_TIME_FORMAT,
        &mut set,
    );

    // 42 seconds is 10 seconds into track 3 (which starts at 32s).
    let mut seek = ParamBlock {
        to: 42_000,
        ..Default::default()
    };
    let rc = f
        .emu
        .send_command(f.emu.device_id(), code::SEEK, CommandFlags::TO, &mut seek);
    assert_eq!(rc, result::OK);

    let status = f.emu.status();
    assert!(status.paused);
    assert!(!status.playing);
    assert_eq!(status.current_track, 3);
    assert_eq!(status.pending_seek, Some(10));

    let mut play = ParamBlock::default();
    let rc = f
        .emu
        .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
    assert_eq!(rc, result::OK);

    assert!(wait_until(
        || f.seeks.lock().unwrap().contains(&(3, 10)),
        Duration::from_secs(2)
    ));

    let mut stop = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);
}

#[test]
fn stop_fires_aborted_never_successful() {
    let f = fixture(&[30]);

    let mut play = ParamBlock::default();
    let rc = f.emu.send_command(
        f.emu.device_id(),
        code::PLAY,
        CommandFlags::NOTIFY,
        &mut play,
    );
    assert_eq!(rc, result::OK);
    assert!(wait_until(|| f.emu.status().playing, Duration::from_secs(2)));

    let mut stop = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);

    let (kind, _) = f.events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(kind, NotifyKind::Aborted);

    // Stopping again while stopped fires nothing at all.
    f.emu
        .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);
    thread::sleep(Duration::from_millis(50));
    assert!(f.events.try_recv().is_err());

    // The captured offset makes the pause resumable.
    let status = f.emu.status();
    assert!(status.paused);
    assert!(status.pending_seek.is_some());
}

#[test]
fn pause_behaves_like_stop() {
    let f = fixture(&[30]);
    let mut play = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
    assert!(wait_until(|| f.emu.status().playing, Duration::from_secs(2)));

    let mut pause = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::PAUSE, CommandFlags::empty(), &mut pause);

    let status = f.emu.status();
    assert!(!status.playing);
    assert!(status.paused);
    // Paused reads back as stopped.
    assert_eq!(status_of(&f.emu, status_item::MODE), mode::STOP);
}

#[test]
fn close_does_not_stop_playback() {
    let f = fixture(&[30]);

    let mut open = ParamBlock {
        device_type: Some("cdaudio".to_string()),
        ..Default::default()
    };
    f.emu
        .send_command(0, code::OPEN, CommandFlags::OPEN_TYPE, &mut open);
    assert_eq!(open.device_id, f.emu.device_id());

    let mut play = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
    assert!(wait_until(|| f.emu.status().playing, Duration::from_secs(2)));

    let mut close = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::CLOSE, CommandFlags::empty(), &mut close);

    let status = f.emu.status();
    assert!(!status.opened);
    assert!(status.playing, "close must leave the driver running");

    // Close while closed: still resets alias and format, nothing else.
    let mut again = ParamBlock::default();
    let rc = f
        .emu
        .send_command(f.emu.device_id(), code::CLOSE, CommandFlags::empty(), &mut again);
    assert_eq!(rc, result::OK);
    assert_eq!(f.emu.status().alias, "cdaudio");
}

#[test]
fn play_without_output_device_fails_without_driver() {
    let f = fixture_with(&[30], EmulatorConfig::default(), false);
    let mut play = ParamBlock::default();
    let rc = f
        .emu
        .send_command(f.emu.device_id(), code::PLAY, CommandFlags::empty(), &mut play);
    assert_eq!(rc, result::HARDWARE_FAILURE);
    assert!(!f.emu.status().playing);
    assert_eq!(f.live_outputs.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_codes_and_foreign_devices_are_relayed() {
    let f = fixture(&[30]);
    let mut params = ParamBlock::default();
    // Unrecognized code on the matched device.
    assert_eq!(
        f.emu
            .send_command(f.emu.device_id(), 0x0999, CommandFlags::empty(), &mut params),
        result::UNRECOGNIZED_COMMAND
    );
    // Recognized code on a foreign device.
    assert_eq!(
        f.emu
            .send_command(0x1234, code::STOP, CommandFlags::empty(), &mut params),
        result::UNRECOGNIZED_COMMAND
    );
}

#[test]
fn status_outputs_written_only_when_requested() {
    let f = fixture(&[30, 0, 45]);
    let mut params = ParamBlock {
        item: status_item::NUMBER_OF_TRACKS,
        ret: 0xDEAD,
        ..Default::default()
    };
    // Without the item flag the output slot keeps its pre-call value.
    f.emu
        .send_command(f.emu.device_id(), code::STATUS, CommandFlags::empty(), &mut params);
    assert_eq!(params.ret, 0xDEAD);

    f.emu.send_command(
        f.emu.device_id(),
        code::STATUS,
        CommandFlags::STATUS_ITEM,
        &mut params,
    );
    assert_eq!(params.ret, 2);
}

#[test]
fn repeated_play_cycles_release_all_resources() {
    let f = fixture(&[30, 0, 45]);

    for _ in 0..3 {
        let mut play = ParamBlock {
            from: timecode::make_msf(0, 2, 0),
            ..Default::default()
        };
        let rc = f.emu.send_command(
            f.emu.device_id(),
            code::PLAY,
            CommandFlags::FROM,
            &mut play,
        );
        assert_eq!(rc, result::OK);
        assert!(wait_until(|| f.emu.status().playing, Duration::from_secs(2)));
    }

    let mut stop = ParamBlock::default();
    f.emu
        .send_command(f.emu.device_id(), code::STOP, CommandFlags::empty(), &mut stop);

    assert!(wait_until(
        || {
            f.live_streams.load(Ordering::SeqCst) == 0
                && f.live_outputs.load(Ordering::SeqCst) == 0
        },
        Duration::from_secs(2)
    ));
}

#[test]
fn full_notify_acknowledges_immediately() {
    let config = EmulatorConfig {
        full_notify: true,
        ..Default::default()
    };
    let f = fixture_with(&[30], config, true);

    let mut open = ParamBlock {
        device_type: Some("cdaudio".to_string()),
        ..Default::default()
    };
    f.emu.send_command(
        0,
        code::OPEN,
        CommandFlags::OPEN_TYPE | CommandFlags::NOTIFY,
        &mut open,
    );
    let (kind, id) = f.events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(kind, NotifyKind::Successful);
    assert_eq!(id, f.emu.device_id());

    // A notify-requesting status query acknowledges too once opened.
    let mut params = ParamBlock {
        item: status_item::MODE,
        ..Default::default()
    };
    f.emu.send_command(
        f.emu.device_id(),
        code::STATUS,
        CommandFlags::STATUS_ITEM | CommandFlags::NOTIFY,
        &mut params,
    );
    let (kind, _) = f.events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(kind, NotifyKind::Successful);
}

#[test]
fn catalog_scan_probes_directory() {
    use std::fs::File;
    let dir = tempfile::TempDir::new().unwrap();
    File::create(dir.path().join("Track01.ogg")).unwrap();
    File::create(dir.path().join("Track02.ogg")).unwrap();
    File::create(dir.path().join("Track04.ogg")).unwrap();

    // Slot 2 probes too short to count as audio.
    let source = MockSource {
        lengths: vec![30, 3, 0, 45],
        seeks: Arc::new(Mutex::new(Vec::new())),
        opened: Arc::new(Mutex::new(Vec::new())),
        live_streams: Arc::new(AtomicIsize::new(0)),
    };
    let catalog = TrackCatalog::scan(dir.path(), &source);

    assert_eq!(catalog.first_track(), 1);
    assert_eq!(catalog.last_track(), 4);
    assert_eq!(catalog.num_tracks(), 2);
    assert!(!catalog.track(2).unwrap().is_audio());
    assert_eq!(catalog.position_of(4), 32);
}
