//! In-memory waveform accumulation.
//!
//! The buffer keeps the raw PCM payload of the current recording and can
//! produce a complete RIFF/WAVE stream of it at any moment, so a snapshot is
//! always playable and can be written to disk byte for byte.

use super::error::AudioError;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::time::Duration;

/// Bits per sample of every recording.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Audio format shared by capture, snapshots and playback.
///
/// Recordings are always mono 16-bit signed PCM; only the sample rate varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Bytes per second of PCM payload.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (BITS_PER_SAMPLE as u32 / 8)
    }

    pub fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        }
    }

    /// Playback length of `bytes` of PCM payload.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / byte_rate as f64)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono(44_100)
    }
}

/// Append-only PCM buffer for one recording.
#[derive(Debug)]
pub struct WaveformBuffer {
    format: AudioFormat,
    pcm: Vec<u8>,
    finalized: bool,
}

impl WaveformBuffer {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            pcm: Vec::new(),
            finalized: false,
        }
    }

    /// Appends one chunk of little-endian 16-bit samples.
    ///
    /// # Errors
    /// - `State` if the buffer has been finalized
    /// - `Format` if the chunk does not hold whole samples
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), AudioError> {
        if self.finalized {
            return Err(AudioError::state(
                "recording has been finalized, no more audio is accepted",
            ));
        }
        if chunk.len() % 2 != 0 {
            return Err(AudioError::Format(format!(
                "chunk of {} bytes does not hold whole 16-bit samples",
                chunk.len()
            )));
        }
        self.pcm.extend_from_slice(chunk);
        Ok(())
    }

    /// Relabels the payload with the rate the device actually captured at.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.format.sample_rate = sample_rate;
    }

    /// Stops accepting appends. Idempotent.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of PCM payload bytes recorded so far.
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.pcm.len())
    }

    /// Encodes the recording so far as a complete WAV stream.
    ///
    /// # Errors
    /// - `Format` if the container cannot describe the payload (e.g. over 4 GiB)
    pub fn snapshot(&self) -> Result<Vec<u8>, AudioError> {
        encode_wav(self.format, &self.pcm)
    }

    /// Copies the raw PCM payload.
    pub fn pcm(&self) -> Vec<u8> {
        self.pcm.clone()
    }
}

/// Wraps a PCM payload in a RIFF/WAVE header.
pub fn encode_wav(format: AudioFormat, pcm: &[u8]) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 64));
    {
        let mut writer = WavWriter::new(&mut cursor, format.wav_spec())?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
