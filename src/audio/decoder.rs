use std::fs::File;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::audio::{AudioStream, StreamSpec, TrackSource};
use crate::error::DecodeError;

/// Track source backed by symphonia; handles every container/codec the
/// `all` feature set enables.
pub struct SymphoniaSource;

impl SymphoniaSource {
    fn probe(path: &Path) -> Result<(Box<dyn FormatReader>, u32), DecodeError> {
        let file = File::open(path).map_err(|_| DecodeError::OpenFailed {
            path: path.display().to_string(),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::UnsupportedFormat {
                details: e.to_string(),
            })?;

        let format = probed.format;
        let track_id = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .map(|t| t.id)
            .ok_or(DecodeError::NoAudioTrack)?;

        Ok((format, track_id))
    }
}

impl TrackSource for SymphoniaSource {
    fn probe_seconds(&self, path: &Path) -> u32 {
        let (format, track_id) = match Self::probe(path) {
            Ok(v) => v,
            Err(_) => return 0,
        };
        let track = match format.tracks().iter().find(|t| t.id == track_id) {
            Some(t) => t,
            None => return 0,
        };
        let params = &track.codec_params;
        match (params.n_frames, params.time_base, params.sample_rate) {
            (Some(frames), Some(tb), _) => tb.calc_time(frames).seconds as u32,
            (Some(frames), None, Some(rate)) if rate > 0 => (frames / rate as u64) as u32,
            _ => 0,
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn AudioStream>, DecodeError> {
        let (format, track_id) = Self::probe(path)?;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.id == track_id)
            .ok_or(DecodeError::NoAudioTrack)?;

        let params = &track.codec_params;
        let sample_rate = params.sample_rate.ok_or(DecodeError::UnsupportedFormat {
            details: "unknown sample rate".to_string(),
        })?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or(DecodeError::UnsupportedFormat {
                details: "unknown channel layout".to_string(),
            })?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                details: e.to_string(),
            })?;

        debug!(
            "opened {} ({} Hz, {} ch)",
            path.display(),
            sample_rate,
            channels
        );

        Ok(Box::new(SymphoniaStream {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            pending: Vec::new(),
            frames_delivered: 0,
        }))
    }
}

/// One decoded stream; counts delivered frames so `tell` reflects what the
/// caller has actually consumed.
struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    pending: Vec<i16>,
    frames_delivered: u64,
}

impl SymphoniaStream {
    /// Decode packets until at least `want_samples` are buffered or the
    /// stream ends. Returns false once the stream is exhausted.
    fn fill(&mut self, want_samples: usize) -> Result<bool, DecodeError> {
        while self.pending.len() < want_samples {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(DecodeError::DecodeFailed {
                        details: e.to_string(),
                    })
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buf =
                        SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                    buf.copy_interleaved_ref(decoded);
                    self.pending.extend_from_slice(buf.samples());
                }
                Err(e) => {
                    warn!("decode failed mid-stream: {}", e);
                    return Err(DecodeError::DecodeFailed {
                        details: e.to_string(),
                    });
                }
            }
        }
        Ok(true)
    }
}

impl AudioStream for SymphoniaStream {
    fn spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 16,
        }
    }

    fn read_chunk(&mut self, max_frames: usize) -> Result<Option<Vec<i16>>, DecodeError> {
        let want = max_frames * self.channels as usize;
        self.fill(want)?;
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = want.min(self.pending.len());
        let chunk: Vec<i16> = self.pending.drain(..take).collect();
        self.frames_delivered += (chunk.len() / self.channels as usize) as u64;
        Ok(Some(chunk))
    }

    fn seek(&mut self, seconds: u32) -> Result<(), DecodeError> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds as f64),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| DecodeError::SeekFailed {
                details: e.to_string(),
            })?;
        // Decoder state is stale after a coarse format-level seek.
        self.decoder.reset();
        self.pending.clear();
        self.frames_delivered = seconds as u64 * self.sample_rate as u64;
        Ok(())
    }

    fn tell(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames_delivered / self.sample_rate as u64) as u32
    }
}
