//! Audio device access.
//!
//! [`AudioBackend`] is the seam between the pipeline and the hardware: it
//! opens input streams that push chunks into a [`ChunkSink`] and output streams
//! that pull frames from a [`PlaybackSource`]. [`CpalBackend`] talks to the
//! system audio host; tests use the in-memory backend in [`testing`].

use super::buffer::AudioFormat;
use super::capture::ChunkSink;
use super::error::AudioError;
use super::playback::PlaybackSource;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};
use std::sync::Arc;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// An open input stream. Dropping it releases the device.
pub trait InputStream {
    /// Stops chunk delivery.
    fn stop(&mut self) -> Result<(), AudioError>;

    /// Rate the device actually captures at, which may differ from the
    /// requested one.
    fn sample_rate(&self) -> u32;
}

/// An open output stream. Dropping it releases the device.
pub trait OutputStream {
    fn start(&mut self) -> Result<(), AudioError>;
    fn pause(&mut self) -> Result<(), AudioError>;
}

/// Opens capture and playback streams.
pub trait AudioBackend {
    /// Opens the input device and starts delivering mono chunks to `sink`.
    ///
    /// `format` is a preference; devices that cannot record mono at that
    /// rate are opened in their default configuration and downmixed.
    fn open_input(
        &self,
        format: AudioFormat,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputStream>, AudioError>;

    /// Opens the output device bound to `source`, initially silent.
    fn open_output(
        &self,
        format: AudioFormat,
        source: Arc<PlaybackSource>,
    ) -> Result<Box<dyn OutputStream>, AudioError>;
}

/// Which side of the audio host a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Backend for the system audio host.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    input_device: String,
    output_device: String,
}

impl CpalBackend {
    /// Creates a backend using the named devices.
    ///
    /// Each device is "default", a device name, or an index from
    /// `mictape list-devices`.
    pub fn new(input_device: impl Into<String>, output_device: impl Into<String>) -> Self {
        Self {
            input_device: input_device.into(),
            output_device: output_device.into(),
        }
    }
}

struct CpalInput {
    stream: cpal::Stream,
    sample_rate: u32,
}

impl InputStream for CpalInput {
    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream.pause().map_err(AudioError::device)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

struct CpalOutput(cpal::Stream);

impl OutputStream for CpalOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        self.0.play().map_err(AudioError::device)
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.0.pause().map_err(AudioError::device)
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        format: AudioFormat,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            find_device(&host, &self.input_device, Direction::Input)
        })?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let preferred = match device.supported_input_configs() {
            Ok(ranges) => pick_config(ranges, format),
            Err(e) => {
                tracing::debug!("Cannot list input configurations: {}", e);
                None
            }
        };
        let supported = match preferred {
            Some(supported) => supported,
            None => {
                let fallback = device.default_input_config().map_err(AudioError::device)?;
                tracing::info!(
                    "Requested sample rate {}Hz is not supported by '{}'. Recording at device rate {}Hz.",
                    format.sample_rate,
                    device_name,
                    fallback.sample_rate().0
                );
                fallback
            }
        };
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        tracing::debug!(
            "Input configuration: {}Hz, {} channel(s), {:?}",
            sample_rate,
            config.channels,
            sample_format
        );

        let err_sink = sink.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::error!("Input stream error: {}", err);
            err_sink.report(AudioError::device(err));
        };

        let mut downmix = MonoDownmix::new(config.channels as usize);
        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    sink.deliver(downmix.convert(data, |s| s))
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.deliver(downmix.convert(data, f32_to_i16))
                },
                on_error,
                None,
            ),
            SampleFormat::I32 => device.build_input_stream(
                &config,
                move |data: &[i32], _: &cpal::InputCallbackInfo| {
                    sink.deliver(downmix.convert(data, |s| (s >> 16) as i16))
                },
                on_error,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    sink.deliver(downmix.convert(data, |s| (s as i32 - 32_768) as i16))
                },
                on_error,
                None,
            ),
            other => {
                return Err(AudioError::Device(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(AudioError::device)?;

        stream.play().map_err(AudioError::device)?;
        tracing::debug!("Input stream started");
        Ok(Box::new(CpalInput {
            stream,
            sample_rate,
        }))
    }

    fn open_output(
        &self,
        format: AudioFormat,
        source: Arc<PlaybackSource>,
    ) -> Result<Box<dyn OutputStream>, AudioError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            find_device(&host, &self.output_device, Direction::Output)
        })?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::debug!("Playback device: {}", device_name);

        let ranges = device
            .supported_output_configs()
            .map_err(AudioError::device)?;
        let supported = pick_config(ranges, format).ok_or_else(|| {
            AudioError::Device(format!(
                "'{device_name}' cannot play audio at {}Hz",
                format.sample_rate
            ))
        })?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        tracing::debug!(
            "Output configuration: {}Hz, {} channel(s), {:?}",
            config.sample_rate.0,
            channels,
            sample_format
        );

        let err_source = Arc::clone(&source);
        let on_error = move |err: cpal::StreamError| {
            tracing::error!("Output stream error: {}", err);
            err_source.report(AudioError::device(err));
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    source.fill(data, channels, 0, |s| s)
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    source.fill(data, channels, 0.0, i16_to_f32)
                },
                on_error,
                None,
            ),
            other => {
                return Err(AudioError::Device(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        }
        .map_err(AudioError::device)?;

        // Some hosts start streams on creation; keep it quiet until played.
        let _ = stream.pause();
        Ok(Box::new(CpalOutput(stream)))
    }
}

/// Picks a device configuration running at the recording's sample rate.
///
/// Fewer channels win, then 16-bit integer samples over 32-bit float.
fn pick_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    format: AudioFormat,
) -> Option<SupportedStreamConfig> {
    let rate = SampleRate(format.sample_rate);
    ranges
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter_map(|range| {
            let rank = match range.sample_format() {
                SampleFormat::I16 => 0,
                SampleFormat::F32 => 1,
                _ => return None,
            };
            Some((range.channels(), rank, range))
        })
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, range)| range.with_sample_rate(rate))
}

/// Turns interleaved device frames into mono 16-bit little-endian PCM by
/// averaging the channels of each frame. The output buffer is reused across
/// callbacks.
pub(crate) struct MonoDownmix {
    channels: usize,
    bytes: Vec<u8>,
}

impl MonoDownmix {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            bytes: Vec::new(),
        }
    }

    pub(crate) fn convert<T: Copy>(&mut self, data: &[T], to_i16: impl Fn(T) -> i16) -> &[u8] {
        self.bytes.clear();
        for frame in data.chunks_exact(self.channels) {
            let sum: i32 = frame.iter().map(|&s| to_i16(s) as i32).sum();
            let mono = (sum / self.channels as i32) as i16;
            self.bytes.extend_from_slice(&mono.to_le_bytes());
        }
        &self.bytes
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Finds an audio device by "default", name, or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
pub fn find_device(
    host: &cpal::Host,
    device_spec: &str,
    direction: Direction,
) -> Result<cpal::Device, AudioError> {
    if device_spec == "default" {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::Device(format!("No audio {} device available", direction.label()))
        });
    }

    let devices: Vec<cpal::Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {e}")))?;

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            AudioError::Device(format!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            ))
        });
    }

    devices
        .into_iter()
        .find(|device| device.name().map_or(false, |name| name == device_spec))
        .ok_or_else(|| {
            AudioError::Device(format!(
                "Audio {} device '{device_spec}' not found. Use 'mictape list-devices' to see available devices.",
                direction.label()
            ))
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
/// On non-Linux platforms, this is a no-op since ALSA doesn't exist.
#[cfg(target_os = "linux")]
pub fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let Ok(dev_null) = OpenOptions::new().write(true).open("/dev/null") else {
        return f();
    };
    let dev_null_fd = dev_null.as_raw_fd();

    // Save the current stderr file descriptor
    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return f();
    }

    if unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return f();
    }

    let result = f();

    // Restore the original stderr
    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms, no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
pub fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    f()
}
