//! Microphone capture.
//!
//! The input stream calls back into a [`ChunkSink`] on the audio subsystem's
//! thread. The sink appends each chunk to the shared waveform buffer, computes
//! its volume and emits a [`SessionEvent::Volume`]. The orchestrator thread
//! starts, stops and resets capture and reads snapshots concurrently, so all
//! buffer access goes through one mutex.

use super::buffer::{encode_wav, AudioFormat, WaveformBuffer};
use super::device::{AudioBackend, InputStream};
use super::error::AudioError;
use super::events::{EventSender, SessionEvent};
use super::volume::compute_volume;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// State shared between the orchestrator and the input callback.
struct CaptureShared {
    /// Current recording, `None` until the first start and after a reset
    buffer: Option<WaveformBuffer>,
    /// Bumped whenever a fresh recording begins or the old one is discarded
    generation: u64,
}

/// Receives chunks from an input stream.
///
/// Each sink is bound to the recording generation it was created for; chunks
/// arriving after that recording was discarded are dropped.
#[derive(Clone)]
pub struct ChunkSink {
    shared: Arc<Mutex<CaptureShared>>,
    generation: u64,
    events: EventSender,
}

impl ChunkSink {
    /// Handles one chunk of little-endian 16-bit mono PCM.
    ///
    /// Never panics and never returns an error: failures become
    /// [`SessionEvent::Error`] and only the offending chunk is skipped.
    pub fn deliver(&self, chunk: &[u8]) {
        let mut shared = self.shared.lock();
        if shared.generation != self.generation {
            return;
        }

        let appended = match shared.buffer.as_mut() {
            Some(buffer) => buffer.append(chunk),
            None => Err(AudioError::state("capture buffer has been discarded")),
        };

        // Sent while holding the lock so events keep chunk order.
        let event = match appended {
            Ok(()) => SessionEvent::Volume(compute_volume(chunk)),
            Err(e) => {
                tracing::warn!("Dropping captured chunk of {} bytes: {}", chunk.len(), e);
                SessionEvent::Error(e)
            }
        };
        let _ = self.events.send(event);
    }

    /// Forwards an error raised by the input stream itself.
    pub fn report(&self, err: AudioError) {
        let current = self.shared.lock().generation == self.generation;
        if current {
            let _ = self.events.send(SessionEvent::Error(err));
        } else {
            tracing::debug!("Ignoring error from discarded capture stream: {}", err);
        }
    }
}

/// Owns the input stream and the recording it feeds.
pub struct AudioCapture {
    /// Format asked of the input device
    requested: AudioFormat,
    /// Format of the current recording, at the rate the device runs at
    format: AudioFormat,
    shared: Arc<Mutex<CaptureShared>>,
    stream: Option<Box<dyn InputStream>>,
    events: EventSender,
}

impl AudioCapture {
    pub fn new(format: AudioFormat, events: EventSender) -> Self {
        Self {
            requested: format,
            format,
            shared: Arc::new(Mutex::new(CaptureShared {
                buffer: None,
                generation: 0,
            })),
            stream: None,
            events,
        }
    }

    /// Opens the input device and starts a new recording.
    ///
    /// The recording takes the sample rate the device actually runs at, which
    /// may differ from the requested one. Starting while the stream is open
    /// does nothing.
    ///
    /// # Errors
    /// - `Device` if the input stream cannot be opened or started; no
    ///   recording is left behind
    pub fn start(&mut self, backend: &dyn AudioBackend) -> Result<(), AudioError> {
        if self.stream.is_some() {
            tracing::debug!("Capture already running");
            return Ok(());
        }

        let generation = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.buffer = Some(WaveformBuffer::new(self.requested));
            shared.generation
        };

        let sink = ChunkSink {
            shared: Arc::clone(&self.shared),
            generation,
            events: self.events.clone(),
        };

        let stream = match backend.open_input(self.requested, sink) {
            Ok(stream) => stream,
            Err(e) => {
                let mut shared = self.shared.lock();
                shared.buffer = None;
                shared.generation += 1;
                return Err(e);
            }
        };

        let format = AudioFormat::mono(stream.sample_rate());
        if format != self.requested {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.requested.sample_rate,
                format.sample_rate
            );
            if let Some(buffer) = self.shared.lock().buffer.as_mut() {
                buffer.set_sample_rate(format.sample_rate);
            }
        }
        self.format = format;
        self.stream = Some(stream);
        tracing::info!(
            "Capture started at {}Hz (recording #{})",
            format.sample_rate,
            generation
        );
        Ok(())
    }

    /// Stops the input stream and finalizes the recording. Idempotent.
    ///
    /// The stream is released and the recording finalized even when the
    /// device reports a failure while stopping.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        let result = match self.stream.take() {
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        };

        let mut shared = self.shared.lock();
        if let Some(buffer) = shared.buffer.as_mut() {
            if !buffer.is_finalized() {
                buffer.finalize();
                tracing::info!(
                    "Capture stopped: {:.2}s ({} bytes)",
                    buffer.duration().as_secs_f32(),
                    buffer.len()
                );
            }
        }

        result
    }

    /// Returns the recording so far as a complete WAV stream.
    ///
    /// # Errors
    /// - `State` if nothing has been recorded since creation or the last reset
    pub fn snapshot(&self) -> Result<Vec<u8>, AudioError> {
        // Copy under the lock, encode outside it so the callback is not held up.
        let (format, pcm) = {
            let shared = self.shared.lock();
            let buffer = shared
                .buffer
                .as_ref()
                .ok_or_else(|| AudioError::state("nothing has been recorded yet"))?;
            (buffer.format(), buffer.pcm())
        };
        encode_wav(format, &pcm)
    }

    /// Stops capture and discards the recording entirely.
    pub fn reset(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                tracing::warn!("Failed to stop input stream during reset: {}", e);
            }
        }

        let mut shared = self.shared.lock();
        shared.buffer = None;
        shared.generation += 1;
        tracing::debug!("Capture reset");
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn has_recording(&self) -> bool {
        self.shared.lock().buffer.is_some()
    }

    pub fn recorded_bytes(&self) -> usize {
        self.shared.lock().buffer.as_ref().map_or(0, WaveformBuffer::len)
    }

    pub fn recorded_duration(&self) -> Duration {
        self.format.duration_of(self.recorded_bytes())
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.stop();
        }
    }
}
