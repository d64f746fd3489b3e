/// Clock sources for the playback engine
/// The audio clock counts frames rendered by a cpal output stream, so the playhead
/// follows the same clock as any audio produced alongside it.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SizedSample;
use log::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

pub struct AudioClock {
    _stream: cpal::Stream,
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioClock {
    pub fn new() -> Option<Self> {
        let frames = Arc::new(AtomicU64::new(0));

        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;
        let sample_rate = config.sample_rate().0 as f64;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), Arc::clone(&frames))
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), Arc::clone(&frames))
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), Arc::clone(&frames))
            }
            format => {
                warn!("unsupported sample format {:?}", format);
                return None;
            }
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not open audio stream: {}", e);
                return None;
            }
        };
        if let Err(e) = stream.play() {
            warn!("could not start audio stream: {}", e);
            return None;
        }

        info!("audio clock running at {} Hz", sample_rate);
        Some(Self {
            _stream: stream,
            frames,
            sample_rate,
        })
    }

    // Outputs silence; the callback only exists to advance the frame counter.
    fn build_stream<T: SizedSample>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        frames: Arc<AtomicU64>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        let channels = config.channels.max(1) as usize;
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                data.fill(T::EQUILIBRIUM);
                frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl Clock for AudioClock {
    fn now(&self) -> f64 {
        frames_to_seconds(self.frames.load(Ordering::Relaxed), self.sample_rate)
    }
}

/// Wall-clock fallback for machines without an output device.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// The audio clock if an output device is available, otherwise the system clock.
pub fn default_clock() -> Box<dyn Clock> {
    match AudioClock::new() {
        Some(clock) => Box::new(clock),
        None => {
            warn!("no audio output, falling back to the system clock");
            Box::new(SystemClock::new())
        }
    }
}

fn frames_to_seconds(frames: u64, sample_rate: f64) -> f64 {
    frames as f64 / sample_rate
}
