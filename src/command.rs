use bitflags::bitflags;
use log::{debug, trace};

use crate::device::{PlayRange, DEVICE_ID_ANY};
use crate::emulator::CdEmulator;
use crate::notify::NotifyKind;
use crate::timecode::{self, TimeFormat};

/// Command codes of the structured interface.
pub mod code {
    pub const OPEN: u32 = 0x0803;
    pub const CLOSE: u32 = 0x0804;
    pub const PLAY: u32 = 0x0806;
    pub const SEEK: u32 = 0x0807;
    pub const STOP: u32 = 0x0808;
    pub const PAUSE: u32 = 0x0809;
    pub const INFO: u32 = 0x080A;
    pub const GETDEVCAPS: u32 = 0x080B;
    pub const SET: u32 = 0x080D;
    pub const SYSINFO: u32 = 0x0810;
    pub const STATUS: u32 = 0x0814;
}

/// Result codes returned to callers.
pub mod result {
    pub const OK: u32 = 0;
    pub const UNRECOGNIZED_COMMAND: u32 = 261;
    pub const HARDWARE_FAILURE: u32 = 262;
}

/// Items of the status command.
pub mod status_item {
    pub const LENGTH: u32 = 1;
    pub const POSITION: u32 = 2;
    pub const NUMBER_OF_TRACKS: u32 = 3;
    pub const MODE: u32 = 4;
    pub const MEDIA_PRESENT: u32 = 5;
    pub const TIME_FORMAT: u32 = 6;
    pub const READY: u32 = 7;
    pub const CURRENT_TRACK: u32 = 8;
    /// CD-audio extension: audio or data classification of a track.
    pub const TYPE_TRACK: u32 = 0x4001;
}

/// Items of the capabilities command.
pub mod caps_item {
    pub const CAN_RECORD: u32 = 1;
    pub const HAS_AUDIO: u32 = 2;
    pub const HAS_VIDEO: u32 = 3;
    pub const DEVICE_TYPE: u32 = 4;
    pub const USES_FILES: u32 = 5;
    pub const IS_COMPOUND: u32 = 6;
    pub const CAN_EJECT: u32 = 7;
    pub const CAN_PLAY: u32 = 8;
    pub const CAN_SAVE: u32 = 9;
}

/// Mode values reported by the status command.
pub mod mode {
    pub const STOP: u32 = 525;
    pub const PLAY: u32 = 526;
}

/// Device type code of a CD-audio device.
pub const DEVTYPE_CD_AUDIO: u32 = 516;

/// Track classification values of the TYPE_TRACK status item.
pub mod track_type {
    pub const AUDIO: u32 = 1098;
    pub const OTHER: u32 = 1099;
}

/// Audio channel selectors of the set command.
pub mod audio_channel {
    pub const ALL: u32 = 0;
    pub const LEFT: u32 = 1;
    pub const RIGHT: u32 = 2;
}

bitflags! {
    /// Flag word of the structured interface. Bits are reused between
    /// command codes, exactly as in the legacy API; the command code
    /// decides which names apply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        const NOTIFY = 0x0000_0001;
        const WAIT = 0x0000_0002;
        const FROM = 0x0000_0004;
        const TO = 0x0000_0008;
        const TRACK = 0x0000_0010;

        const OPEN_SHAREABLE = 0x0000_0100;
        const OPEN_ALIAS = 0x0000_0400;
        const OPEN_TYPE_ID = 0x0000_1000;
        const OPEN_TYPE = 0x0000_2000;

        const SEEK_TO_START = 0x0000_0100;
        const SEEK_TO_END = 0x0000_0200;

        const SET_TIME_FORMAT = 0x0000_0400;
        const SET_AUDIO = 0x0000_0800;
        const SET_ON = 0x0000_2000;
        const SET_OFF = 0x0000_4000;

        const STATUS_ITEM = 0x0000_0100;
        const STATUS_START = 0x0000_0200;

        const GETDEVCAPS_ITEM = 0x0000_0100;

        const INFO_PRODUCT = 0x0000_0100;
        const INFO_IDENTITY = 0x0000_0800;

        const SYSINFO_QUANTITY = 0x0000_0100;
        const SYSINFO_OPEN = 0x0000_0200;
        const SYSINFO_NAME = 0x0000_0400;
        const SYSINFO_INSTALLNAME = 0x0000_0800;

        const _ = !0;
    }
}

/// In/out parameter block. Mirrors the per-command parameter structs of
/// the legacy interface; output fields are written only when the flag word
/// requests them, and otherwise keep their pre-call value.
#[derive(Debug, Default, Clone)]
pub struct ParamBlock {
    /// Device type name for open (`cdaudio`).
    pub device_type: Option<String>,
    /// Numeric device type for open with a type id.
    pub device_type_id: u32,
    /// Alias requested by open.
    pub alias: Option<String>,
    /// Assigned device identifier, written by open.
    pub device_id: u32,
    /// Range start, interpreted per the active time format.
    pub from: u32,
    /// Range end / seek target, interpreted per the active time format.
    pub to: u32,
    /// Raw time format code for set.
    pub time_format: u32,
    /// Audio channel selector for set.
    pub audio: u32,
    /// Queried item for status / getdevcaps.
    pub item: u32,
    /// Track operand for track-scoped status queries.
    pub track: u32,
    /// Numeric answer.
    pub ret: u32,
    /// String answer (info / sysinfo).
    pub ret_str: String,
}

impl CdEmulator {
    /// Structured command entry point. Returns 0 on success; commands for
    /// other devices and unrecognized codes go to the relay.
    pub fn send_command(
        &self,
        device_id: u32,
        code: u32,
        flags: CommandFlags,
        params: &mut ParamBlock,
    ) -> u32 {
        trace!(
            "command {:#06x} device {:#x} flags {:#x}",
            code,
            device_id,
            flags.bits()
        );

        if code == code::OPEN {
            return self.cmd_open(device_id, code, flags, params);
        }

        if device_id != self.device_id && device_id != 0 && device_id != DEVICE_ID_ANY {
            return self.relay.send_command(device_id, code, flags, params);
        }

        match code {
            code::CLOSE => self.cmd_close(flags),
            code::PLAY => self.cmd_play(flags, params),
            code::SEEK => self.cmd_seek(flags, params),
            code::STOP | code::PAUSE => self.cmd_stop(flags),
            code::SET => self.cmd_set(flags, params),
            code::STATUS => self.cmd_status(flags, params),
            code::INFO => self.cmd_info(flags, params),
            code::GETDEVCAPS => self.cmd_getdevcaps(flags, params),
            code::SYSINFO => self.cmd_sysinfo(flags, params),
            _ => self.relay.send_command(device_id, code, flags, params),
        }
    }

    fn cmd_open(
        &self,
        device_id: u32,
        code: u32,
        flags: CommandFlags,
        params: &mut ParamBlock,
    ) -> u32 {
        let by_id =
            flags.contains(CommandFlags::OPEN_TYPE_ID) && params.device_type_id == DEVTYPE_CD_AUDIO;
        let by_name = flags.contains(CommandFlags::OPEN_TYPE)
            && params
                .device_type
                .as_deref()
                .map(|t| t.eq_ignore_ascii_case("cdaudio"))
                .unwrap_or(false);
        if !by_id && !by_name {
            return self.relay.send_command(device_id, code, flags, params);
        }

        params.device_id = self.device_id;

        let was_opened;
        {
            let mut state = self.state();
            was_opened = state.opened;
            if flags.contains(CommandFlags::OPEN_ALIAS) {
                if let Some(alias) = &params.alias {
                    state.alias = alias.to_ascii_lowercase();
                }
            }
            state.opened = true;
        }
        debug!("device opened, id {:#x}", self.device_id);

        if flags.contains(CommandFlags::NOTIFY) && self.full_notify && !was_opened {
            self.post_settled(NotifyKind::Successful);
        }
        result::OK
    }

    fn cmd_close(&self, flags: CommandFlags) -> u32 {
        // Intentionally does not stop playback; closing the control handle
        // while the disc keeps playing is long-standing legacy behavior.
        self.state().reset();
        self.ack_notify(flags.contains(CommandFlags::NOTIFY));
        self.state().opened = false;
        debug!("device closed");
        result::OK
    }

    fn cmd_set(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        if flags.contains(CommandFlags::SET_TIME_FORMAT) {
            let format = TimeFormat::from_raw(params.time_format);
            debug!("time format set to {}", format.name());
            self.state().time_format = format;
        }
        if flags.contains(CommandFlags::SET_AUDIO) && params.audio == audio_channel::ALL {
            // Left/right selectors are accepted but have no effect.
            if flags.contains(CommandFlags::SET_ON) {
                self.set_volume(100);
            }
            if flags.contains(CommandFlags::SET_OFF) {
                self.set_volume(0);
            }
        }
        self.ack_notify(flags.contains(CommandFlags::NOTIFY));
        result::OK
    }

    fn cmd_getdevcaps(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        if flags.contains(CommandFlags::GETDEVCAPS_ITEM) {
            params.ret = match params.item {
                caps_item::CAN_PLAY | caps_item::CAN_EJECT | caps_item::HAS_AUDIO => 1,
                caps_item::DEVICE_TYPE => DEVTYPE_CD_AUDIO,
                _ => 0,
            };
        }
        self.ack_notify(flags.contains(CommandFlags::NOTIFY));
        result::OK
    }

    fn cmd_info(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        if flags.contains(CommandFlags::INFO_PRODUCT) {
            params.ret_str = "CD Audio".to_string();
        } else if flags.contains(CommandFlags::INFO_IDENTITY) {
            params.ret_str = "ABCD1234".to_string();
        }
        self.ack_notify(flags.contains(CommandFlags::NOTIFY));
        result::OK
    }

    fn cmd_sysinfo(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        if flags.contains(CommandFlags::SYSINFO_QUANTITY) {
            params.ret_str = "1".to_string();
        } else if flags.contains(CommandFlags::SYSINFO_NAME)
            || flags.contains(CommandFlags::SYSINFO_INSTALLNAME)
        {
            params.ret_str = "cdaudio".to_string();
        }
        result::OK
    }

    fn cmd_stop(&self, flags: CommandFlags) -> u32 {
        let requested = flags.contains(CommandFlags::NOTIFY) | self.take_string_notify();

        let was_playing = self
            .shared
            .playing
            .load(std::sync::atomic::Ordering::Acquire);
        // Halt before capturing the resume offset; a still-running driver
        // could otherwise consume the pending seek and clear it.
        self.halt_driver();
        if was_playing {
            self.shared.set_pending_seek(self.shared.position());
            self.shared
                .paused
                .store(true, std::sync::atomic::Ordering::Release);
        }
        self.abort_armed();
        self.ack_notify(requested);
        result::OK
    }

    fn cmd_seek(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        use std::sync::atomic::Ordering;

        let requested = flags.contains(CommandFlags::NOTIFY) | self.take_string_notify();
        self.abort_armed();
        self.halt_driver();

        let format = self.state().time_format;
        let catalog = &self.catalog;

        if flags.contains(CommandFlags::SEEK_TO_START) {
            let first = catalog.first_track();
            self.shared.current_track.store(first.max(1), Ordering::Release);
            self.shared.clear_pending_seek();
            self.shared.paused.store(false, Ordering::Release);
        } else if flags.contains(CommandFlags::SEEK_TO_END) {
            // Terminal position; deliberately not resumable.
            self.shared.clear_pending_seek();
            self.shared.paused.store(false, Ordering::Release);
        } else if flags.contains(CommandFlags::TO) && !catalog.is_empty() {
            let (slot, offset) = self.resolve_seek_target(params.to, format);
            self.shared.current_track.store(slot, Ordering::Release);
            if offset != 0 && self.accurate_seek {
                self.shared.set_pending_seek(offset);
                self.shared.paused.store(true, Ordering::Release);
            } else {
                self.shared.clear_pending_seek();
                self.shared.paused.store(false, Ordering::Release);
            }
        }

        self.ack_notify(requested);
        result::OK
    }

    /// Map a seek target to (track slot, intra-track offset in seconds).
    fn resolve_seek_target(&self, raw: u32, format: TimeFormat) -> (usize, u32) {
        let catalog = &self.catalog;
        match format {
            TimeFormat::Tmsf => {
                let slot = (timecode::tmsf_track(raw) as usize)
                    .clamp(catalog.first_track(), catalog.last_track());
                (slot, timecode::tmsf_to_seconds(raw))
            }
            TimeFormat::Milliseconds => {
                let seconds = raw / 1000;
                // A shared boundary second belongs to the following track
                // here, hence the +1 bias in the search target.
                let slot = catalog.locate(seconds + 1);
                (slot, seconds.saturating_sub(catalog.position_of(slot)))
            }
            TimeFormat::Msf | TimeFormat::Other(_) => {
                let seconds = timecode::msf_to_seconds(raw);
                let slot = catalog.locate(seconds + 1);
                (slot, seconds.saturating_sub(catalog.position_of(slot)))
            }
        }
    }

    /// Resolve an explicit play-range end into the stored one-past bound
    /// plus an optional stop offset within the effective final track.
    fn resolve_play_to(&self, raw: u32, format: TimeFormat, first: usize) -> (usize, Option<u32>) {
        let catalog = &self.catalog;
        let (slot, offset) = match format {
            TimeFormat::Tmsf => {
                let slot = (timecode::tmsf_track(raw) as usize)
                    .clamp(catalog.first_track(), catalog.last_track());
                (slot, timecode::tmsf_to_seconds(raw))
            }
            TimeFormat::Milliseconds => {
                let seconds = raw / 1000;
                let slot = catalog.locate(seconds);
                (slot, seconds.saturating_sub(catalog.position_of(slot)))
            }
            TimeFormat::Msf | TimeFormat::Other(_) => {
                let seconds = timecode::msf_to_seconds(raw);
                let slot = catalog.locate(seconds);
                (slot, seconds.saturating_sub(catalog.position_of(slot)))
            }
        };

        if catalog.track(slot).map(|t| t.is_audio()).unwrap_or(false) {
            if offset != 0 && self.accurate_seek {
                // A mid-track target includes the named track up to the
                // stop boundary.
                let last = if slot == first { first } else { slot + 1 };
                (last, Some(offset))
            } else {
                // A target on the track boundary (or any target with
                // accurate seeking off) excludes the named track; the slot
                // itself already is the one-past bound.
                (slot, None)
            }
        } else {
            // A range ending on a data slot rolls forward to the next
            // playable track with a zero boundary offset, so the completion
            // notification still fires at the range boundary.
            let next = (slot + 1..=catalog.last_track())
                .find(|&s| catalog.track(s).map(|t| t.is_audio()).unwrap_or(false))
                .unwrap_or(catalog.last_track());
            let last = if next == first { first } else { next + 1 };
            (last, Some(0))
        }
    }

    fn cmd_play(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        use std::sync::atomic::Ordering;

        self.abort_armed();
        let requested = flags.contains(CommandFlags::NOTIFY) | self.take_string_notify();
        let was_playing = self.shared.playing.load(Ordering::Acquire);

        // A from-less play while a range is underway must not restart it;
        // only an implicit seek to the current position is queued.
        if was_playing && !flags.contains(CommandFlags::FROM) {
            self.shared.set_pending_seek(self.shared.position());
            if requested {
                self.shared.notify_armed.store(true, Ordering::Release);
            }
            return result::OK;
        }

        // Halt any previous range before touching the shared slots, so the
        // old worker cannot consume the new pending seek.
        self.halt_driver();

        let catalog = &self.catalog;
        if catalog.is_empty() {
            // Nothing playable: the range completes immediately.
            if requested {
                self.sink.post(NotifyKind::Successful, self.device_id);
            }
            return result::OK;
        }

        let format = self.state().time_format;
        self.shared.clear_stop_offset();

        let mut first = self.shared.current_track.load(Ordering::Acquire);
        if flags.contains(CommandFlags::FROM) {
            let (slot, offset) = self.resolve_seek_target(params.from, format);
            first = slot;
            if offset != 0 && self.accurate_seek {
                self.shared.set_pending_seek(offset);
            } else {
                self.shared.clear_pending_seek();
            }
        }
        first = first.clamp(catalog.first_track(), catalog.last_track());

        let mut last = catalog.last_track() + 1;
        let mut stop = None;
        if flags.contains(CommandFlags::TO) {
            let (l, s) = self.resolve_play_to(params.to, format, first);
            last = l;
            stop = s;
        }
        if last < first {
            last = first;
        }
        if last > catalog.last_track() + 1 {
            last = catalog.last_track() + 1;
        }

        self.shared.current_track.store(first, Ordering::Release);
        if let Some(s) = stop {
            self.shared.set_stop_offset(s);
        }
        if requested {
            self.shared.notify_armed.store(true, Ordering::Release);
        }

        if !self.output.available() {
            debug!("play abandoned, no output device");
            return result::HARDWARE_FAILURE;
        }

        self.shared.paused.store(false, Ordering::Release);
        match self.start_driver(PlayRange { first, last }) {
            Ok(()) => result::OK,
            Err(_) => result::HARDWARE_FAILURE,
        }
    }

    fn cmd_status(&self, flags: CommandFlags, params: &mut ParamBlock) -> u32 {
        use std::sync::atomic::Ordering;

        if !flags.contains(CommandFlags::STATUS_ITEM) {
            self.ack_notify(flags.contains(CommandFlags::NOTIFY));
            return result::OK;
        }

        let catalog = &self.catalog;
        let format = self.state().time_format;
        let current = self.shared.current_track.load(Ordering::Acquire);
        let playing = self.shared.playing.load(Ordering::Acquire);
        let paused = self.shared.paused.load(Ordering::Acquire);

        match params.item {
            status_item::CURRENT_TRACK => {
                params.ret = current as u32;
            }
            status_item::NUMBER_OF_TRACKS => {
                params.ret = catalog.num_tracks() as u32;
            }
            status_item::MEDIA_PRESENT | status_item::READY => {
                params.ret = 1;
            }
            status_item::TIME_FORMAT => {
                params.ret = format.as_raw();
            }
            status_item::MODE => {
                // Paused is deliberately indistinguishable from stopped.
                params.ret = if playing && !paused {
                    mode::PLAY
                } else {
                    mode::STOP
                };
            }
            status_item::TYPE_TRACK => {
                let audio = catalog
                    .track(params.track as usize)
                    .map(|t| t.is_audio())
                    .unwrap_or(false);
                params.ret = if audio {
                    track_type::AUDIO
                } else {
                    track_type::OTHER
                };
            }
            status_item::LENGTH => {
                if flags.contains(CommandFlags::TRACK) {
                    let length = catalog
                        .track(params.track as usize)
                        .map(|t| t.length)
                        .unwrap_or(0);
                    params.ret = match format {
                        TimeFormat::Milliseconds => length * 1000,
                        _ => timecode::seconds_to_msf(length),
                    };
                } else {
                    params.ret = match format {
                        TimeFormat::Milliseconds => catalog.end_position() * 1000,
                        _ => timecode::seconds_to_msf(catalog.total_seconds()),
                    };
                }
            }
            status_item::POSITION => {
                if flags.contains(CommandFlags::STATUS_START) {
                    let first = catalog.first_track().max(1);
                    params.ret = match format {
                        TimeFormat::Milliseconds => catalog.position_of(first) * 1000,
                        TimeFormat::Tmsf => timecode::make_tmsf(first as u32, 0, 0, 0),
                        _ => timecode::seconds_to_msf(catalog.position_of(first)),
                    };
                } else if flags.contains(CommandFlags::TRACK) {
                    let slot = params.track;
                    params.ret = match format {
                        TimeFormat::Milliseconds => catalog.position_of(slot as usize) * 1000,
                        TimeFormat::Tmsf => timecode::make_tmsf(slot, 0, 0, 0),
                        _ => timecode::seconds_to_msf(catalog.position_of(slot as usize)),
                    };
                } else {
                    let base = catalog.position_of(current);
                    let offset = if playing && !paused {
                        self.shared.position()
                    } else if paused {
                        self.shared.pending_seek().unwrap_or(0)
                    } else {
                        0
                    };
                    params.ret = match format {
                        TimeFormat::Milliseconds => (base + offset) * 1000,
                        TimeFormat::Tmsf => timecode::seconds_to_tmsf(current as u32, offset),
                        _ => timecode::seconds_to_msf(base + offset),
                    };
                }
            }
            _ => {
                // Unknown item: output slot keeps its pre-call value.
            }
        }

        self.ack_notify(flags.contains(CommandFlags::NOTIFY));
        result::OK
    }
}
