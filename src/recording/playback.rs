//! Playback of a recorded snapshot.
//!
//! The snapshot is decoded up front; the output stream then pulls frames from
//! a [`PlaybackSource`] on the audio subsystem's thread. Only play and stop are
//! supported, there is no seeking and no pause.

use super::buffer::{AudioFormat, BITS_PER_SAMPLE};
use super::device::{AudioBackend, OutputStream};
use super::error::AudioError;
use super::events::{EventSender, SessionEvent};
use hound::{SampleFormat, WavReader};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Playback cursor. Position and the playing flag change together, so a
/// rewind from the orchestrator can never be overwritten by a callback that
/// was already running.
#[derive(Debug, Default)]
struct PlayHead {
    position: usize,
    playing: bool,
}

/// Decoded samples plus the playback cursor, shared with the output callback.
pub struct PlaybackSource {
    samples: Vec<i16>,
    head: Mutex<PlayHead>,
    events: EventSender,
}

impl PlaybackSource {
    pub fn new(samples: Vec<i16>, events: EventSender) -> Self {
        Self {
            samples,
            head: Mutex::new(PlayHead::default()),
            events,
        }
    }

    /// Fills an interleaved output buffer, copying each mono sample to every
    /// channel of its frame.
    ///
    /// Writes silence while stopped. Reaching the end clears the playing flag
    /// and emits [`SessionEvent::PlaybackFinished`] once.
    pub fn fill<T: Copy>(&self, out: &mut [T], channels: usize, silence: T, convert: impl Fn(i16) -> T) {
        let finished = {
            let mut head = self.head.lock();
            if !head.playing {
                out.fill(silence);
                return;
            }

            for frame in out.chunks_mut(channels.max(1)) {
                match self.samples.get(head.position) {
                    Some(&sample) => {
                        frame.fill(convert(sample));
                        head.position += 1;
                    }
                    None => frame.fill(silence),
                }
            }

            let finished = head.position >= self.samples.len();
            if finished {
                head.playing = false;
            }
            finished
        };

        if finished {
            let _ = self.events.send(SessionEvent::PlaybackFinished);
        }
    }

    /// Forwards an error raised by the output stream itself.
    pub fn report(&self, err: AudioError) {
        let _ = self.events.send(SessionEvent::Error(err));
    }

    pub fn is_playing(&self) -> bool {
        self.head.lock().playing
    }

    pub fn position(&self) -> usize {
        self.head.lock().position
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn begin(&self) {
        let mut head = self.head.lock();
        if head.position >= self.samples.len() {
            head.position = 0;
        }
        head.playing = true;
    }

    fn halt(&self) {
        let mut head = self.head.lock();
        head.playing = false;
        head.position = 0;
    }
}

/// Owns the output stream bound to one snapshot.
pub struct AudioPlayback {
    format: AudioFormat,
    source: Arc<PlaybackSource>,
    stream: Box<dyn OutputStream>,
}

impl AudioPlayback {
    /// Decodes `snapshot` and opens the output device for it.
    ///
    /// # Errors
    /// - `Format` if the bytes are not a mono 16-bit PCM WAV stream
    /// - `Device` if the output stream cannot be opened
    pub fn new(
        snapshot: &[u8],
        backend: &dyn AudioBackend,
        events: EventSender,
    ) -> Result<Self, AudioError> {
        let (format, samples) = decode_snapshot(snapshot)?;
        let source = Arc::new(PlaybackSource::new(samples, events));
        let stream = backend.open_output(format, Arc::clone(&source))?;

        tracing::debug!(
            "Playback ready: {} samples at {}Hz",
            source.len(),
            format.sample_rate
        );
        Ok(Self {
            format,
            source,
            stream,
        })
    }

    /// Starts playing from the current position, or from the beginning if the
    /// previous run reached the end.
    pub fn play(&mut self) -> Result<(), AudioError> {
        self.source.begin();
        if let Err(e) = self.stream.start() {
            self.source.halt();
            return Err(e);
        }
        tracing::info!("Playback started ({:.2}s)", self.duration().as_secs_f32());
        Ok(())
    }

    /// Halts playback and rewinds to the beginning. Idempotent.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        let was_playing = self.source.is_playing();
        self.source.halt();
        self.stream.pause()?;
        if was_playing {
            tracing::info!("Playback stopped");
        }
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.source.len() * 2)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.source.halt();
        let _ = self.stream.pause();
    }
}

/// Parses a WAV stream into its format and samples.
fn decode_snapshot(snapshot: &[u8]) -> Result<(AudioFormat, Vec<i16>), AudioError> {
    let mut reader = WavReader::new(Cursor::new(snapshot)).map_err(AudioError::format)?;
    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != BITS_PER_SAMPLE
        || spec.sample_format != SampleFormat::Int
    {
        return Err(AudioError::Format(format!(
            "only mono 16-bit PCM is supported, got {} channel(s) at {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }

    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(AudioError::format)?;

    Ok((AudioFormat::mono(spec.sample_rate), samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::buffer::encode_wav;
    use crate::recording::device::testing::MemoryBackend;
    use crate::recording::events;

    fn wav(samples: &[i16]) -> Vec<u8> {
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        encode_wav(AudioFormat::mono(8000), &pcm).unwrap()
    }

    #[test]
    fn test_garbage_snapshot_is_format_error() {
        let backend = MemoryBackend::new();
        let (tx, _rx) = events::channel();
        let err = AudioPlayback::new(b"definitely not RIFF", &backend, tx)
            .err()
            .unwrap();
        assert!(err.is_format());
        assert_eq!(backend.outputs_opened(), 0);
    }

    #[test]
    fn test_stereo_snapshot_is_rejected() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(1i16).unwrap();
            writer.write_sample(2i16).unwrap();
            writer.finalize().unwrap();
        }

        let backend = MemoryBackend::new();
        let (tx, _rx) = events::channel();
        let err = AudioPlayback::new(&cursor.into_inner(), &backend, tx)
            .err()
            .unwrap();
        assert!(err.is_format());
    }

    #[test]
    fn test_device_failure_is_device_error() {
        let backend = MemoryBackend::new();
        backend.fail_output(true);
        let (tx, _rx) = events::channel();
        let err = AudioPlayback::new(&wav(&[1, 2]), &backend, tx).err().unwrap();
        assert!(err.is_device());
    }

    #[test]
    fn test_silent_until_played() {
        let backend = MemoryBackend::new();
        let (tx, _rx) = events::channel();
        let playback = AudioPlayback::new(&wav(&[10, 20]), &backend, tx).unwrap();

        assert!(!playback.is_playing());
        assert_eq!(backend.pull(2), vec![0, 0]);
        assert_eq!(playback.format(), AudioFormat::mono(8000));
    }

    #[test]
    fn test_plays_to_end_and_reports_finish_once() {
        let backend = MemoryBackend::new();
        let (tx, rx) = events::channel();
        let mut playback = AudioPlayback::new(&wav(&[10, 20, 30]), &backend, tx).unwrap();

        playback.play().unwrap();
        assert!(backend.output_running());
        assert_eq!(backend.pull(2), vec![10, 20]);
        assert_eq!(backend.pull(2), vec![30, 0]);
        assert_eq!(backend.pull(2), vec![0, 0]);
        assert!(!playback.is_playing());

        let finished = rx
            .try_iter()
            .filter(|e| matches!(e, SessionEvent::PlaybackFinished))
            .count();
        assert_eq!(finished, 1);

        // Playing again after the end starts over.
        playback.play().unwrap();
        assert_eq!(backend.pull(1), vec![10]);
    }

    #[test]
    fn test_stop_rewinds() {
        let backend = MemoryBackend::new();
        let (tx, _rx) = events::channel();
        let mut playback = AudioPlayback::new(&wav(&[1, 2, 3, 4]), &backend, tx).unwrap();

        playback.play().unwrap();
        assert_eq!(backend.pull(2), vec![1, 2]);
        playback.stop().unwrap();
        playback.stop().unwrap();
        assert!(!backend.output_running());

        playback.play().unwrap();
        assert_eq!(backend.pull(2), vec![1, 2]);
    }

    #[test]
    fn test_fill_duplicates_mono_across_channels() {
        let (tx, _rx) = events::channel();
        let source = PlaybackSource::new(vec![5, -5], tx);
        source.begin();

        let mut out = [0.0f32; 6];
        source.fill(&mut out, 2, 0.0, |s| s as f32);
        assert_eq!(out, [5.0, 5.0, -5.0, -5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_halt_during_callbacks_always_rewinds() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let (tx, _rx) = events::channel();
        let source = Arc::new(PlaybackSource::new(vec![1; 10_000_000], tx));

        for _ in 0..200 {
            source.begin();
            let done = Arc::new(AtomicBool::new(false));
            let filler = {
                let source = Arc::clone(&source);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut out = [0i16; 256];
                    while !done.load(Ordering::Acquire) {
                        source.fill(&mut out, 1, 0, |s| s);
                    }
                })
            };

            while source.position() == 0 {
                thread::yield_now();
            }
            source.halt();
            done.store(true, Ordering::Release);
            filler.join().unwrap();

            assert_eq!(source.position(), 0);
            assert!(!source.is_playing());
        }
    }

    #[test]
    fn test_duration_of_snapshot() {
        let backend = MemoryBackend::new();
        let (tx, _rx) = events::channel();
        let playback = AudioPlayback::new(&wav(&vec![0; 4000]), &backend, tx).unwrap();
        assert_eq!(playback.duration(), Duration::from_millis(500));
    }
}
