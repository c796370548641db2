use log::trace;

use crate::command::{code, mode, status_item, track_type, CommandFlags, ParamBlock, result};
use crate::emulator::CdEmulator;
use crate::timecode::{self, TimeFormat};

/// Token immediately following `key` in a whitespace-separated line.
fn token_after<'a>(cmd: &'a str, key: &str) -> Option<&'a str> {
    let mut words = cmd.split_whitespace();
    while let Some(word) = words.next() {
        if word == key {
            return words.next();
        }
    }
    None
}

fn track_operand(cmd: &str) -> u32 {
    token_after(cmd, "track")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0)
}

impl CdEmulator {
    /// String command entry point. Recognized commands answer synthetically
    /// or re-express themselves as one structured call; anything else goes
    /// to the relay untouched.
    pub fn send_string(&self, command: &str, answer: &mut String) -> u32 {
        let cmd = command.trim().to_ascii_lowercase();
        answer.clear();
        trace!("string command: {}", cmd);

        let (alias, format, opened) = {
            let state = self.state();
            (state.alias.clone(), state.time_format, state.opened)
        };

        if cmd.starts_with(&format!("info {}", alias)) {
            if cmd.contains("identity") {
                answer.push_str("ABCD1234");
                return result::OK;
            }
            if cmd.contains("product") {
                answer.push_str("CD Audio");
                return result::OK;
            }
        }

        if cmd.starts_with(&format!("capability {}", alias)) {
            if cmd.contains("device type") {
                answer.push_str("cdaudio");
            } else if cmd.contains("can eject")
                || cmd.contains("can play")
                || cmd.contains("has audio")
            {
                answer.push_str("true");
            } else {
                answer.push_str("false");
            }
            return result::OK;
        }

        if cmd.starts_with("sysinfo cdaudio") {
            if cmd.contains("quantity") {
                answer.push_str("1");
                return result::OK;
            }
            if cmd.contains("name") && cmd.contains("open") {
                answer.push_str(&alias);
                return result::OK;
            }
            if cmd.contains("installname") || cmd.contains("name") {
                answer.push_str("cdaudio");
                return result::OK;
            }
        }

        if cmd.starts_with(&format!("stop {}", alias)) || cmd.starts_with(&format!("pause {}", alias))
        {
            if cmd.contains("notify") && self.full_notify && opened {
                self.arm_string_notify();
            }
            let op = if cmd.starts_with("stop") {
                code::STOP
            } else {
                code::PAUSE
            };
            let mut params = ParamBlock::default();
            self.send_command(self.device_id, op, CommandFlags::empty(), &mut params);
            return result::OK;
        }

        if cmd.starts_with("open ") && cmd.contains("cdaudio") {
            let mut flags = CommandFlags::OPEN_TYPE;
            let mut params = ParamBlock {
                device_type: Some("cdaudio".to_string()),
                ..Default::default()
            };
            if let Some(new_alias) = token_after(&cmd, "alias") {
                flags |= CommandFlags::OPEN_ALIAS;
                params.alias = Some(new_alias.to_string());
            }
            if cmd.contains("notify") {
                flags |= CommandFlags::NOTIFY;
            }
            let rc = self.send_command(self.device_id, code::OPEN, flags, &mut params);
            if rc == result::OK {
                answer.push_str(&params.device_id.to_string());
            }
            return rc;
        }

        if cmd.starts_with(&format!("close {}", alias)) {
            let flags = if cmd.contains("notify") {
                CommandFlags::NOTIFY
            } else {
                CommandFlags::empty()
            };
            let mut params = ParamBlock::default();
            self.send_command(self.device_id, code::CLOSE, flags, &mut params);
            return result::OK;
        }

        if cmd.starts_with(&format!("set {}", alias)) {
            // Order matters below: "tmsf" contains "msf", and "msf"
            // contains "ms".
            let new_format = if cmd.contains("milliseconds") {
                Some(timecode::FORMAT_MILLISECONDS)
            } else if cmd.contains("tmsf") {
                Some(timecode::FORMAT_TMSF)
            } else if cmd.contains("msf") {
                Some(timecode::FORMAT_MSF)
            } else if cmd.contains(" ms") {
                Some(timecode::FORMAT_MILLISECONDS)
            } else {
                None
            };
            if let Some(raw) = new_format {
                let mut params = ParamBlock {
                    time_format: raw,
                    ..Default::default()
                };
                self.send_command(
                    self.device_id,
                    code::SET,
                    CommandFlags::SET_TIME_FORMAT,
                    &mut params,
                );
                return result::OK;
            }
            if cmd.contains("audio all off") {
                let mut params = ParamBlock::default();
                self.send_command(
                    self.device_id,
                    code::SET,
                    CommandFlags::SET_AUDIO | CommandFlags::SET_OFF,
                    &mut params,
                );
                return result::OK;
            }
            if cmd.contains("audio all on") {
                let mut params = ParamBlock::default();
                self.send_command(
                    self.device_id,
                    code::SET,
                    CommandFlags::SET_AUDIO | CommandFlags::SET_ON,
                    &mut params,
                );
                return result::OK;
            }
            // Left/right channel selections are accepted no-ops.
            if cmd.contains("audio left") || cmd.contains("audio right") {
                return result::OK;
            }
        }

        if cmd.starts_with(&format!("status {}", alias)) {
            return self.string_status(&cmd, format, answer);
        }

        if cmd.starts_with(&format!("seek {}", alias)) {
            if cmd.contains("notify") && self.full_notify && opened {
                self.arm_string_notify();
            }
            if cmd.contains("to start") {
                let mut params = ParamBlock::default();
                self.send_command(
                    self.device_id,
                    code::SEEK,
                    CommandFlags::SEEK_TO_START,
                    &mut params,
                );
                return result::OK;
            }
            if cmd.contains("to end") {
                let mut params = ParamBlock::default();
                self.send_command(
                    self.device_id,
                    code::SEEK,
                    CommandFlags::SEEK_TO_END,
                    &mut params,
                );
                return result::OK;
            }
            if let Some(packed) = token_after(&cmd, "to").and_then(|t| timecode::parse_operand(t, format))
            {
                let mut params = ParamBlock {
                    to: packed,
                    ..Default::default()
                };
                self.send_command(self.device_id, code::SEEK, CommandFlags::TO, &mut params);
                return result::OK;
            }
        }

        if cmd.starts_with(&format!("play {}", alias)) {
            if cmd.contains("notify") {
                self.arm_string_notify();
            }
            let mut flags = CommandFlags::empty();
            let mut params = ParamBlock::default();
            if let Some(packed) =
                token_after(&cmd, "from").and_then(|t| timecode::parse_operand(t, format))
            {
                params.from = packed;
                flags |= CommandFlags::FROM;
            }
            if let Some(packed) = token_after(&cmd, "to").and_then(|t| timecode::parse_operand(t, format))
            {
                params.to = packed;
                flags |= CommandFlags::TO;
            }
            self.send_command(self.device_id, code::PLAY, flags, &mut params);
            return result::OK;
        }

        self.relay.send_string(command, answer)
    }

    fn string_status(&self, cmd: &str, format: TimeFormat, answer: &mut String) -> u32 {
        if cmd.contains("time format") {
            answer.push_str(format.name());
            return result::OK;
        }
        if cmd.contains("number of tracks") {
            answer.push_str(&self.status_number(status_item::NUMBER_OF_TRACKS, 0).to_string());
            return result::OK;
        }
        if cmd.contains("current track") {
            answer.push_str(&self.status_number(status_item::CURRENT_TRACK, 0).to_string());
            return result::OK;
        }
        if cmd.contains("type track") {
            let kind = self.status_number(status_item::TYPE_TRACK, track_operand(cmd));
            answer.push_str(if kind == track_type::AUDIO { "audio" } else { "other" });
            return result::OK;
        }
        if cmd.contains("length track") {
            let raw = self.status_number(status_item::LENGTH, track_operand(cmd));
            answer.push_str(&format_length(raw, format));
            return result::OK;
        }
        if cmd.contains("length") {
            let raw = self.status_number(status_item::LENGTH, 0);
            answer.push_str(&format_length(raw, format));
            return result::OK;
        }
        if cmd.contains("position track") {
            let raw = self.status_number(status_item::POSITION, track_operand(cmd));
            answer.push_str(&format_position(raw, format));
            return result::OK;
        }
        if cmd.contains("start position") {
            let mut params = ParamBlock {
                item: status_item::POSITION,
                ..Default::default()
            };
            self.send_command(
                self.device_id,
                code::STATUS,
                CommandFlags::STATUS_ITEM | CommandFlags::STATUS_START,
                &mut params,
            );
            answer.push_str(&format_position(params.ret, format));
            return result::OK;
        }
        if cmd.contains("position") {
            let raw = self.status_number(status_item::POSITION, 0);
            answer.push_str(&format_position(raw, format));
            return result::OK;
        }
        if cmd.contains("media present") {
            answer.push_str("TRUE");
            return result::OK;
        }
        if cmd.contains("mode") {
            let raw = self.status_number(status_item::MODE, 0);
            answer.push_str(if raw == mode::PLAY { "playing" } else { "stopped" });
            return result::OK;
        }
        let mut relayed = String::new();
        let rc = self.relay.send_string(cmd, &mut relayed);
        answer.push_str(&relayed);
        rc
    }

    /// One numeric status query; a non-zero `track` adds the track flag.
    fn status_number(&self, item: u32, track: u32) -> u32 {
        let mut flags = CommandFlags::STATUS_ITEM;
        if track != 0 || item == status_item::TYPE_TRACK {
            flags |= CommandFlags::TRACK;
        }
        let mut params = ParamBlock {
            item,
            track,
            ..Default::default()
        };
        self.send_command(self.device_id, code::STATUS, flags, &mut params);
        params.ret
    }
}

fn format_length(raw: u32, format: TimeFormat) -> String {
    match format {
        TimeFormat::Milliseconds => raw.to_string(),
        _ => timecode::format_msf(raw),
    }
}

fn format_position(raw: u32, format: TimeFormat) -> String {
    match format {
        TimeFormat::Milliseconds => raw.to_string(),
        TimeFormat::Tmsf => timecode::format_tmsf(raw),
        _ => timecode::format_msf(raw),
    }
}
