use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use log::{debug, warn};

use crate::audio::{OutputBackend, OutputDevice, StreamSpec};
use crate::error::OutputError;

/// Output backend over the host's default audio device.
pub struct CpalBackend;

impl OutputBackend for CpalBackend {
    fn available(&self) -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    fn open(&self, spec: StreamSpec) -> Result<Box<dyn OutputDevice>, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_format = device
            .default_output_config()
            .map_err(|e| OutputError::OpenFailed {
                details: e.to_string(),
            })?
            .sample_format();

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            done: Condvar::new(),
        });

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, shared.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, shared.clone()),
            _ => build_stream::<f32>(&device, &config, shared.clone()),
        }?;

        stream.play().map_err(|e| OutputError::StreamError {
            details: e.to_string(),
        })?;

        debug!(
            "output stream open: {} Hz, {} ch, {:?}",
            spec.sample_rate, spec.channels, sample_format
        );

        Ok(Box::new(CpalOutput {
            shared,
            _stream: stream,
        }))
    }
}

/// A submitted chunk plus how much of it the callback has consumed.
struct Chunk {
    pcm: Vec<i16>,
    read: usize,
}

struct Shared {
    queue: Mutex<VecDeque<Chunk>>,
    done: Condvar,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let mut queue = match shared.queue.lock() {
                    Ok(q) => q,
                    Err(_) => return,
                };
                let mut retired = false;
                for slot in data.iter_mut() {
                    loop {
                        match queue.front_mut() {
                            Some(chunk) if chunk.read < chunk.pcm.len() => {
                                *slot = T::from_sample(chunk.pcm[chunk.read]);
                                chunk.read += 1;
                                break;
                            }
                            Some(_) => {
                                queue.pop_front();
                                retired = true;
                            }
                            None => {
                                *slot = T::EQUILIBRIUM;
                                break;
                            }
                        }
                    }
                }
                if let Some(front) = queue.front() {
                    if front.read >= front.pcm.len() {
                        queue.pop_front();
                        retired = true;
                    }
                }
                if retired {
                    shared.done.notify_all();
                }
            },
            |e| warn!("output stream error: {}", e),
            None,
        )
        .map_err(|e| OutputError::OpenFailed {
            details: e.to_string(),
        })
}

struct CpalOutput {
    shared: Arc<Shared>,
    _stream: cpal::Stream,
}

impl OutputDevice for CpalOutput {
    fn submit(&mut self, pcm: Vec<i16>) -> Result<(), OutputError> {
        let mut queue = self.shared.queue.lock().map_err(|_| OutputError::StreamError {
            details: "output queue poisoned".to_string(),
        })?;
        queue.push_back(Chunk { pcm, read: 0 });
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.shared.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn wait_done(&mut self, timeout: Duration) {
        if let Ok(queue) = self.shared.queue.lock() {
            let _ = self.shared.done.wait_timeout(queue, timeout);
        }
    }

    fn reset(&mut self) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.clear();
        }
        self.shared.done.notify_all();
    }
}
