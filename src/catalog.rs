use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::audio::TrackSource;

/// Highest addressable track slot plus one; slots run 1..=98.
pub const MAX_TRACKS: usize = 99;
/// Single fixed pregap before the first track, in seconds.
pub const PREGAP_SECONDS: u32 = 2;
/// Tracks shorter than this are treated as data slots.
pub const MIN_AUDIO_SECONDS: u32 = 4;

const EXTENSIONS: [&str; 4] = ["ogg", "mp3", "flac", "wav"];

/// One slot of the disc image. Data slots keep their start position so
/// they remain addressable but carry no path and zero length.
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub path: Option<PathBuf>,
    /// Whole seconds; zero for data slots.
    pub length: u32,
    /// Start position on the virtual disc, whole seconds.
    pub position: u32,
}

impl Track {
    pub fn is_audio(&self) -> bool {
        self.path.is_some()
    }
}

/// Immutable table of tracks built once at startup.
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
    first_track: usize,
    last_track: usize,
    num_tracks: usize,
}

impl TrackCatalog {
    /// Scan `dir` for `TrackNN.*` files, probing durations through `source`.
    pub fn scan(dir: &Path, source: &dyn TrackSource) -> Self {
        Self::build(|slot| {
            for ext in EXTENSIONS {
                let path = dir.join(format!("Track{:02}.{}", slot, ext));
                if path.exists() {
                    return (Some(path.clone()), source.probe_seconds(&path));
                }
            }
            (None, 0)
        })
    }

    /// Build a synthetic catalog from per-slot lengths, slot 1 first.
    /// A zero length marks a data slot.
    pub fn from_lengths(lengths: &[u32]) -> Self {
        Self::build(|slot| {
            let length = lengths.get(slot - 1).copied().unwrap_or(0);
            if length > 0 {
                (Some(PathBuf::from(format!("Track{:02}.ogg", slot))), length)
            } else {
                (None, 0)
            }
        })
    }

    fn build(probe: impl Fn(usize) -> (Option<PathBuf>, u32)) -> Self {
        let mut tracks = vec![Track::default(); MAX_TRACKS];
        let mut position = 0u32;
        let mut first_track = 0usize;
        let mut last_track = 0usize;
        let mut num_tracks = 1usize;

        for slot in 1..MAX_TRACKS {
            let (path, length) = probe(slot);
            tracks[slot].position = position + PREGAP_SECONDS;

            if length < MIN_AUDIO_SECONDS {
                if path.is_some() {
                    debug!("slot {} too short ({}s), treated as data", slot, length);
                }
                continue;
            }

            tracks[slot].path = path;
            tracks[slot].length = length;
            if first_track == 0 {
                first_track = slot;
            }
            // A disc whose audio starts at slot 1 has no leading data track
            // folded into the count.
            if slot == num_tracks {
                num_tracks -= 1;
            }
            num_tracks += 1;
            last_track = slot;
            position += length;

            debug!(
                "track {:02}: length {}s position {}s",
                slot, length, tracks[slot].position
            );
        }

        info!(
            "catalog: {} tracks reported, playable range {}..={}, {}s total",
            num_tracks, first_track, last_track, position
        );

        Self {
            tracks,
            first_track,
            last_track,
            num_tracks,
        }
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Track count as reported to callers. One leading data slot is folded
    /// into the count when the first playable track is not slot 1.
    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    /// First playable slot, 0 when the catalog has no audio.
    pub fn first_track(&self) -> usize {
        self.first_track
    }

    /// Last playable slot, 0 when the catalog has no audio.
    pub fn last_track(&self) -> usize {
        self.last_track
    }

    pub fn is_empty(&self) -> bool {
        self.first_track == 0
    }

    /// Sum of playable track lengths in seconds.
    pub fn total_seconds(&self) -> u32 {
        self.tracks.iter().map(|t| t.length).sum()
    }

    /// One past the end of the last playable track, in disc seconds.
    pub fn end_position(&self) -> u32 {
        let last = &self.tracks[self.last_track];
        last.position + last.length
    }

    /// Start position of a slot; 0 for out-of-range indices.
    pub fn position_of(&self, index: usize) -> u32 {
        self.tracks.get(index).map(|t| t.position).unwrap_or(0)
    }

    /// Map an absolute disc position to the playable track containing it.
    ///
    /// Both the start and the end boundary of a track are inclusive, so a
    /// shared boundary second resolves to the earlier track. Data slots are
    /// skipped. A position before the first track (inside the pregap)
    /// clamps to the first playable track; a position past the end falls
    /// back to the last playable track scanned (0 for an empty catalog).
    pub fn locate(&self, seconds: u32) -> usize {
        let target = seconds as i64;
        if self.first_track != 0 && target < self.tracks[self.first_track].position as i64 {
            return self.first_track;
        }
        let mut scanned = 0usize;
        for slot in self.first_track..=self.last_track {
            let track = &self.tracks[slot];
            if !track.is_audio() {
                continue;
            }
            scanned = slot;
            let start = track.position as i64;
            let end = (track.position + track.length) as i64;
            if (target - start) * (target - end) <= 0 {
                return slot;
            }
        }
        scanned
    }
}
