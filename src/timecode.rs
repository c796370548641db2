//! Packed time representations of the legacy control interface.
//!
//! MSF packs minute/second/frame into the low three bytes of a word;
//! TMSF prepends a track byte. The emulator has whole-second resolution,
//! so frame fields are always written as zero and ignored when read.

/// Raw value of the milliseconds time format.
pub const FORMAT_MILLISECONDS: u32 = 0;
/// Raw value of the minute/second/frame time format.
pub const FORMAT_MSF: u32 = 2;
/// Raw value of the track/minute/second/frame time format.
pub const FORMAT_TMSF: u32 = 10;

/// Active time format of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    Milliseconds,
    Msf,
    Tmsf,
    /// A format code the device does not support; stored and echoed back,
    /// position rendering falls back to MSF.
    Other(u32),
}

impl Default for TimeFormat {
    fn default() -> Self {
        TimeFormat::Msf
    }
}

impl TimeFormat {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            FORMAT_MILLISECONDS => TimeFormat::Milliseconds,
            FORMAT_MSF => TimeFormat::Msf,
            FORMAT_TMSF => TimeFormat::Tmsf,
            other => TimeFormat::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            TimeFormat::Milliseconds => FORMAT_MILLISECONDS,
            TimeFormat::Msf => FORMAT_MSF,
            TimeFormat::Tmsf => FORMAT_TMSF,
            TimeFormat::Other(raw) => raw,
        }
    }

    /// Name used by the string interface's `status ... time format` answer.
    pub fn name(self) -> &'static str {
        match self {
            TimeFormat::Milliseconds => "milliseconds",
            TimeFormat::Msf => "msf",
            TimeFormat::Tmsf => "tmsf",
            TimeFormat::Other(_) => "unsupported",
        }
    }
}

pub fn make_msf(minute: u32, second: u32, frame: u32) -> u32 {
    (minute & 0xFF) | ((second & 0xFF) << 8) | ((frame & 0xFF) << 16)
}

pub fn msf_minute(packed: u32) -> u32 {
    packed & 0xFF
}

pub fn msf_second(packed: u32) -> u32 {
    (packed >> 8) & 0xFF
}

pub fn msf_frame(packed: u32) -> u32 {
    (packed >> 16) & 0xFF
}

pub fn make_tmsf(track: u32, minute: u32, second: u32, frame: u32) -> u32 {
    (track & 0xFF) | ((minute & 0xFF) << 8) | ((second & 0xFF) << 16) | ((frame & 0xFF) << 24)
}

pub fn tmsf_track(packed: u32) -> u32 {
    packed & 0xFF
}

pub fn tmsf_minute(packed: u32) -> u32 {
    (packed >> 8) & 0xFF
}

pub fn tmsf_second(packed: u32) -> u32 {
    (packed >> 16) & 0xFF
}

pub fn tmsf_frame(packed: u32) -> u32 {
    (packed >> 24) & 0xFF
}

/// Seconds encoded by an MSF word; the frame byte is ignored.
pub fn msf_to_seconds(packed: u32) -> u32 {
    msf_minute(packed) * 60 + msf_second(packed)
}

/// Intra-track offset in seconds encoded by a TMSF word.
pub fn tmsf_to_seconds(packed: u32) -> u32 {
    tmsf_minute(packed) * 60 + tmsf_second(packed)
}

pub fn seconds_to_msf(seconds: u32) -> u32 {
    make_msf(seconds / 60, seconds % 60, 0)
}

pub fn seconds_to_tmsf(track: u32, seconds: u32) -> u32 {
    make_tmsf(track, seconds / 60, seconds % 60, 0)
}

/// Format an MSF word the way the string interface answers it.
pub fn format_msf(packed: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        msf_minute(packed),
        msf_second(packed),
        msf_frame(packed)
    )
}

/// Format a TMSF word the way the string interface answers it.
pub fn format_tmsf(packed: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        tmsf_track(packed),
        tmsf_minute(packed),
        tmsf_second(packed),
        tmsf_frame(packed)
    )
}

/// Parse a colon-separated time operand under the active format.
///
/// The most specific accepted spelling wins: TMSF takes one to four fields
/// (`t`, `t:m`, `t:m:s`, `t:m:s:f`), MSF one to three, milliseconds a bare
/// integer. Frame fields are accepted and discarded.
pub fn parse_operand(text: &str, format: TimeFormat) -> Option<u32> {
    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;

    match format {
        TimeFormat::Tmsf => match parts[..] {
            [t] => Some(make_tmsf(t, 0, 0, 0)),
            [t, m] => Some(make_tmsf(t, m, 0, 0)),
            [t, m, s] => Some(make_tmsf(t, m, s, 0)),
            [t, m, s, _] => Some(make_tmsf(t, m, s, 0)),
            _ => None,
        },
        TimeFormat::Milliseconds => match parts[..] {
            [ms] => Some(ms),
            _ => None,
        },
        // Unsupported formats parse like MSF, matching how positions are
        // rendered for them.
        TimeFormat::Msf | TimeFormat::Other(_) => match parts[..] {
            [m] => Some(make_msf(m, 0, 0)),
            [m, s] => Some(make_msf(m, s, 0)),
            [m, s, _] => Some(make_msf(m, s, 0)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msf_roundtrip_whole_seconds() {
        for &secs in &[0u32, 1, 59, 60, 61, 3599, 3600, 5000] {
            let packed = seconds_to_msf(secs);
            assert_eq!(msf_to_seconds(packed), secs);
            assert_eq!(msf_frame(packed), 0);
        }
    }

    #[test]
    fn test_tmsf_roundtrip_preserves_track_and_seconds() {
        let packed = seconds_to_tmsf(7, 125);
        assert_eq!(tmsf_track(packed), 7);
        assert_eq!(tmsf_to_seconds(packed), 125);
        assert_eq!(tmsf_frame(packed), 0);
    }

    #[test]
    fn test_frames_ignored_on_read() {
        let packed = make_msf(2, 30, 44);
        assert_eq!(msf_to_seconds(packed), 150);

        let packed = make_tmsf(3, 1, 15, 70);
        assert_eq!(tmsf_to_seconds(packed), 75);
    }

    #[test]
    fn test_format_rendering() {
        assert_eq!(format_msf(make_msf(4, 5, 0)), "04:05:00");
        assert_eq!(format_tmsf(make_tmsf(12, 1, 9, 0)), "12:01:09:00");
    }

    #[test]
    fn test_parse_operand_tmsf_specificity() {
        assert_eq!(parse_operand("5", TimeFormat::Tmsf), Some(make_tmsf(5, 0, 0, 0)));
        assert_eq!(parse_operand("5:2", TimeFormat::Tmsf), Some(make_tmsf(5, 2, 0, 0)));
        assert_eq!(parse_operand("5:2:30", TimeFormat::Tmsf), Some(make_tmsf(5, 2, 30, 0)));
        // Frames accepted and dropped
        assert_eq!(parse_operand("5:2:30:70", TimeFormat::Tmsf), Some(make_tmsf(5, 2, 30, 0)));
    }

    #[test]
    fn test_parse_operand_msf_and_milliseconds() {
        assert_eq!(parse_operand("2:30", TimeFormat::Msf), Some(make_msf(2, 30, 0)));
        assert_eq!(parse_operand("2:30:10", TimeFormat::Msf), Some(make_msf(2, 30, 0)));
        assert_eq!(parse_operand("45000", TimeFormat::Milliseconds), Some(45000));
        assert_eq!(parse_operand("1:2", TimeFormat::Milliseconds), None);
    }

    #[test]
    fn test_parse_operand_rejects_garbage() {
        assert_eq!(parse_operand("abc", TimeFormat::Msf), None);
        assert_eq!(parse_operand("1:x", TimeFormat::Tmsf), None);
        assert_eq!(parse_operand("", TimeFormat::Msf), None);
    }
}
