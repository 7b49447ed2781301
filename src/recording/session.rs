//! Recording session state machine.
//!
//! `RecordingSession` is driven from a single orchestrator thread. It owns the
//! capture, at most one playback instance and the volume series, and drains
//! the event channel the audio threads write to. Every transition stops any
//! active playback first so capture and playback never contend for devices.
//!
//! ```text
//! Idle --start--> Recording --stop--> Stopped <--play/stop playing--> Playing
//!   ^                                                                    |
//!   +------------------------------ reset (from any state) --------------+
//! ```

use super::buffer::AudioFormat;
use super::capture::AudioCapture;
use super::device::AudioBackend;
use super::error::{ActionError, AudioError, SessionAction};
use super::events::{self, EventReceiver, EventSender, SessionEvent};
use super::playback::AudioPlayback;
use super::volume::VolumeSeries;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopped,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Stopped => write!(f, "stopped"),
            Self::Playing => write!(f, "playing"),
        }
    }
}

/// Chooses where a recording is saved.
///
/// Returns `None` when the user cancels.
pub trait DestinationPicker {
    fn pick_destination(&mut self) -> Option<PathBuf>;
}

impl<F> DestinationPicker for F
where
    F: FnMut() -> Option<PathBuf>,
{
    fn pick_destination(&mut self) -> Option<PathBuf> {
        self()
    }
}

/// Result of a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    Cancelled,
}

/// Coordinates capture, playback and the volume feed.
pub struct RecordingSession<B: AudioBackend> {
    backend: B,
    capture: AudioCapture,
    playback: Option<AudioPlayback>,
    state: SessionState,
    series: VolumeSeries,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl<B: AudioBackend> RecordingSession<B> {
    pub fn new(backend: B, format: AudioFormat) -> Self {
        let (events_tx, events_rx) = events::channel();
        Self {
            backend,
            capture: AudioCapture::new(format, events_tx.clone()),
            playback: None,
            state: SessionState::Idle,
            series: VolumeSeries::new(),
            events_tx,
            events_rx,
        }
    }

    /// Discards any previous take and starts capturing.
    ///
    /// On failure the session is left idle with no recording.
    pub fn start_recording(&mut self) -> Result<(), ActionError> {
        self.halt_playback();
        self.clear();

        if let Err(e) = self.capture.start(&self.backend) {
            tracing::error!("Failed to start recording: {}", e);
            return Err(ActionError::new(SessionAction::StartRecording, e));
        }

        self.state = SessionState::Recording;
        tracing::info!("Recording started");
        Ok(())
    }

    /// Stops capturing and prepares playback of the take.
    ///
    /// If the snapshot cannot be turned into a playback instance the recording
    /// is still kept and can be saved. A device failure while stopping does not
    /// affect the take; it is reported as a [`SessionEvent::Error`].
    pub fn stop_recording(&mut self) -> Result<(), ActionError> {
        let fail = |e| ActionError::new(SessionAction::StopRecording, e);

        if self.state != SessionState::Recording {
            return Err(fail(AudioError::state("not recording")));
        }

        self.halt_playback();
        if let Err(e) = self.capture.stop() {
            tracing::warn!("Input device reported an error while stopping: {}", e);
            let _ = self.events_tx.send(SessionEvent::Error(e));
        }
        self.state = SessionState::Stopped;
        tracing::info!(
            "Recording stopped ({:.2}s)",
            self.capture.recorded_duration().as_secs_f32()
        );

        let snapshot = self.capture.snapshot().map_err(fail)?;
        match AudioPlayback::new(&snapshot, &self.backend, self.events_tx.clone()) {
            Ok(playback) => self.playback = Some(playback),
            Err(e) => {
                tracing::error!("Recording kept but playback is unavailable: {}", e);
                return Err(fail(e));
            }
        }
        Ok(())
    }

    /// Plays the take from the beginning, restarting if already playing.
    pub fn play(&mut self) -> Result<(), ActionError> {
        let fail = |e| ActionError::new(SessionAction::Play, e);

        if !matches!(self.state, SessionState::Stopped | SessionState::Playing) {
            return Err(fail(AudioError::state(match self.state {
                SessionState::Recording => "stop the recording before playing it",
                _ => "nothing has been recorded yet",
            })));
        }
        let playback = self
            .playback
            .as_mut()
            .ok_or_else(|| fail(AudioError::state("the recording is not playable")))?;

        playback.stop().map_err(fail)?;
        playback.play().map_err(fail)?;
        self.state = SessionState::Playing;
        Ok(())
    }

    /// Stops playback if a playback instance exists.
    pub fn stop_playing(&mut self) -> Result<(), ActionError> {
        if let Some(playback) = self.playback.as_mut() {
            playback
                .stop()
                .map_err(|e| ActionError::new(SessionAction::StopPlaying, e))?;
        }
        if self.state == SessionState::Playing {
            self.state = SessionState::Stopped;
        }
        Ok(())
    }

    /// Writes the current snapshot to a destination chosen by `picker`.
    ///
    /// Nothing is written, and the picker is not consulted, when no recording
    /// exists.
    pub fn save(&mut self, mut picker: impl DestinationPicker) -> Result<SaveOutcome, ActionError> {
        let fail = |e| ActionError::new(SessionAction::Save, e);

        self.halt_playback();
        if !self.capture.has_recording() {
            return Err(fail(AudioError::state("nothing has been recorded yet")));
        }

        let Some(destination) = picker.pick_destination() else {
            tracing::debug!("Save cancelled");
            return Ok(SaveOutcome::Cancelled);
        };

        self.save_to(&destination)?;
        Ok(SaveOutcome::Saved(destination))
    }

    /// Writes the current snapshot to `destination`.
    pub fn save_to(&mut self, destination: &Path) -> Result<(), ActionError> {
        let fail = |e| ActionError::new(SessionAction::Save, e);

        self.halt_playback();
        let snapshot = self.capture.snapshot().map_err(fail)?;
        fs::write(destination, &snapshot).map_err(|e| {
            tracing::error!("Failed to write {}: {}", destination.display(), e);
            fail(AudioError::Io(e))
        })?;

        tracing::info!(
            "Recording saved: {} ({} bytes)",
            destination.display(),
            snapshot.len()
        );
        Ok(())
    }

    /// Returns to idle: stops everything and discards the take and its volume
    /// series. Best effort; problems are logged, never returned.
    pub fn reset(&mut self) {
        self.halt_playback();
        self.clear();
        tracing::info!("Session cleared");
    }

    /// Drains notifications from the audio threads.
    ///
    /// Volume samples are appended to the series, a finished playback moves
    /// the session back to `Stopped`. All events are returned in arrival order
    /// so the caller can surface errors.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let events: Vec<SessionEvent> = self.events_rx.try_iter().collect();
        for event in &events {
            match event {
                SessionEvent::Volume(volume) => self.series.push(*volume),
                SessionEvent::PlaybackFinished => {
                    let still_playing = self.playback.as_ref().is_some_and(|p| p.is_playing());
                    if self.state == SessionState::Playing && !still_playing {
                        self.state = SessionState::Stopped;
                        tracing::debug!("Playback finished");
                    }
                }
                SessionEvent::Error(e) => tracing::warn!("Audio thread reported: {}", e),
            }
        }
        events
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Normalized volume of the most recent chunk, 0 after a reset.
    pub fn volume_level(&self) -> f32 {
        self.series.level()
    }

    pub fn series(&self) -> &VolumeSeries {
        &self.series
    }

    pub fn has_playback(&self) -> bool {
        self.playback.is_some()
    }

    pub fn recorded_duration(&self) -> Duration {
        self.capture.recorded_duration()
    }

    pub fn format(&self) -> AudioFormat {
        self.capture.format()
    }

    /// Stops the playback instance, if any. Failures are queued as events.
    fn halt_playback(&mut self) {
        if let Some(playback) = self.playback.as_mut() {
            if let Err(e) = playback.stop() {
                tracing::warn!("Failed to stop playback: {}", e);
                let _ = self.events_tx.send(SessionEvent::Error(e));
            }
        }
        if self.state == SessionState::Playing {
            self.state = SessionState::Stopped;
        }
    }

    /// Drops playback, discards the capture and empties the volume feed.
    fn clear(&mut self) {
        // Dropping the instance releases its stream and the sender it held.
        self.playback = None;
        self.capture.reset();
        self.series.clear();

        // Volume and finish events still queued belong to the discarded take;
        // errors are kept for the caller.
        let stale: Vec<SessionEvent> = self.events_rx.try_iter().collect();
        for event in stale {
            if let SessionEvent::Error(e) = event {
                let _ = self.events_tx.send(SessionEvent::Error(e));
            }
        }

        self.state = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::device::testing::MemoryBackend;
    use hound::WavReader;
    use std::io::Cursor;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn session() -> (RecordingSession<MemoryBackend>, MemoryBackend) {
        let backend = MemoryBackend::new();
        let session = RecordingSession::new(backend.clone(), AudioFormat::mono(8000));
        (session, backend)
    }

    fn recorded(samples: &[i16]) -> (RecordingSession<MemoryBackend>, MemoryBackend) {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        backend.deliver(&pcm(samples));
        session.stop_recording().unwrap();
        session.poll_events();
        (session, backend)
    }

    #[test]
    fn test_half_scale_chunk_scenario() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        assert_eq!(session.state(), SessionState::Recording);

        backend.deliver(&pcm(&[16384, -16384]));
        session.poll_events();

        let level = session.volume_level();
        assert!((level - 0.5).abs() < 1e-6);
        assert!((level * 1000.0 - 500.0).abs() < 1e-3);
        assert_eq!(session.series().len(), 1);
        assert_eq!(session.series().points()[0].index, 0);
    }

    #[test]
    fn test_stop_recording_produces_playable_snapshot() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[1, 2, 3]));
        backend.deliver(&pcm(&[4, 5]));
        session.stop_recording().unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.has_playback());
        assert!(!backend.input_open());
        assert_eq!(backend.outputs_opened(), 1);

        session.play().unwrap();
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(backend.pull(5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stop_recording_requires_recording() {
        let (mut session, _backend) = session();
        let err = session.stop_recording().unwrap_err();
        assert_eq!(err.action, SessionAction::StopRecording);
        assert!(err.source.is_state());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_play_without_recording_is_state_error() {
        let (mut session, backend) = session();
        let err = session.play().unwrap_err();
        assert_eq!(err.action, SessionAction::Play);
        assert!(err.source.is_state());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(backend.outputs_opened(), 0);
    }

    #[test]
    fn test_play_while_recording_is_state_error() {
        let (mut session, _backend) = session();
        session.start_recording().unwrap();
        assert!(session.play().unwrap_err().source.is_state());
        assert_eq!(session.state(), SessionState::Recording);
    }

    #[test]
    fn test_play_restarts_from_beginning() {
        let (mut session, backend) = recorded(&[1, 2, 3, 4]);
        session.play().unwrap();
        assert_eq!(backend.pull(2), vec![1, 2]);

        session.play().unwrap();
        assert_eq!(backend.pull(2), vec![1, 2]);
    }

    #[test]
    fn test_finished_playback_returns_to_stopped() {
        let (mut session, backend) = recorded(&[9, 9]);
        session.play().unwrap();
        backend.pull(4);

        let events = session.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::PlaybackFinished)));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_stop_playing_without_playback_is_noop() {
        let (mut session, _backend) = session();
        session.stop_playing().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_playing_returns_to_stopped() {
        let (mut session, backend) = recorded(&[1, 2, 3]);
        session.play().unwrap();
        session.stop_playing().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!backend.output_running());
    }

    #[test]
    fn test_start_recording_stops_playback_and_discards_take() {
        let (mut session, backend) = recorded(&[1, 2, 3]);
        session.play().unwrap();
        assert!(backend.output_running());

        session.start_recording().unwrap();
        assert!(!backend.output_running());
        assert!(!session.has_playback());
        assert!(session.series().is_empty());
        assert_eq!(session.recorded_duration(), Duration::ZERO);
        assert_eq!(backend.inputs_opened(), 2);
    }

    #[test]
    fn test_failed_start_stays_idle() {
        let (mut session, backend) = session();
        backend.fail_input(true);

        let err = session.start_recording().unwrap_err();
        assert_eq!(err.action, SessionAction::StartRecording);
        assert!(err.source.is_device());
        assert_eq!(session.state(), SessionState::Idle);

        backend.fail_input(false);
        session.start_recording().unwrap();
        assert_eq!(session.state(), SessionState::Recording);
    }

    #[test]
    fn test_failed_start_leaves_nothing_to_save() {
        let (mut session, backend) = session();
        backend.fail_input(true);
        assert!(session.start_recording().is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let err = session.save(|| Some(path.clone())).unwrap_err();
        assert!(err.source.is_state());
        assert!(!path.exists());
        assert_eq!(session.recorded_duration(), Duration::ZERO);
    }

    #[test]
    fn test_take_uses_device_rate() {
        let (mut session, backend) = session();
        backend.set_input_rate(48_000);
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[100, 200, 300]));
        session.stop_recording().unwrap();
        assert_eq!(session.format(), AudioFormat::mono(48_000));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        session.save_to(&path).unwrap();
        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.spec().channels, 1);

        assert_eq!(backend.output_format(), Some(AudioFormat::mono(48_000)));
        session.play().unwrap();
        assert_eq!(backend.pull(3), vec![100, 200, 300]);
    }

    #[test]
    fn test_device_error_on_stop_keeps_take_and_is_reported() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[5, 6]));
        backend.fail_input_stop(true);

        session.stop_recording().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.has_playback());
        assert!(!backend.input_open());

        let events = session.poll_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::Error(e) if e.is_device())));

        session.play().unwrap();
        assert_eq!(backend.pull(2), vec![5, 6]);
    }

    #[test]
    fn test_playback_failure_keeps_recording() {
        let (mut session, backend) = session();
        backend.fail_output(true);
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[7, 8]));

        let err = session.stop_recording().unwrap_err();
        assert!(err.source.is_device());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.has_playback());
        assert!(session.play().unwrap_err().source.is_state());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept.wav");
        session.save_to(&path).unwrap();
        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn test_reset_clears_from_every_state() {
        // Idle
        let (mut session, _backend) = session();
        session.reset();
        assert!(session.series().is_empty());
        assert_eq!(session.volume_level(), 0.0);

        // Recording, with unpolled volume events still queued
        let (mut session, backend) = self::session();
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[1000, 1000]));
        session.poll_events();
        backend.deliver(&pcm(&[2000, 2000]));
        session.reset();
        session.poll_events();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.series().is_empty());
        assert_eq!(session.volume_level(), 0.0);
        assert!(!backend.input_open());

        // Playing
        let (mut session, backend) = recorded(&[5000, 5000]);
        session.play().unwrap();
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.series().is_empty());
        assert_eq!(session.volume_level(), 0.0);
        assert!(!session.has_playback());
        assert!(!backend.output_running());
    }

    #[test]
    fn test_reset_keeps_pending_errors() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        backend.deliver(&[1, 2, 3]);
        session.reset();

        let events = session.poll_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Error(ref e) if e.is_format()));
    }

    #[test]
    fn test_save_without_recording_creates_no_file() {
        let (mut session, _backend) = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.wav");

        let mut asked = false;
        let err = session
            .save(|| {
                asked = true;
                Some(path.clone())
            })
            .unwrap_err();
        assert_eq!(err.action, SessionAction::Save);
        assert!(err.source.is_state());
        assert!(!asked);
        assert!(!path.exists());
    }

    #[test]
    fn test_save_cancelled_writes_nothing() {
        let (mut session, _backend) = recorded(&[1, 2]);
        let outcome = session.save(|| None::<PathBuf>).unwrap();
        assert_eq!(outcome, SaveOutcome::Cancelled);
    }

    #[test]
    fn test_save_writes_snapshot_verbatim() {
        let (mut session, _backend) = recorded(&[16384, -16384, 42]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let outcome = session.save(|| Some(path.clone())).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(path.clone()));

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.ends_with(&pcm(&[16384, -16384, 42])));
        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16384, -16384, 42]);
    }

    #[test]
    fn test_save_while_recording_writes_progress() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        backend.deliver(&pcm(&[3, 4]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");
        session.save_to(&path).unwrap();
        assert_eq!(session.state(), SessionState::Recording);
        assert_eq!(WavReader::open(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_save_to_bad_path_is_io_error() {
        let (mut session, _backend) = recorded(&[1]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("take.wav");

        let err = session.save_to(&path).unwrap_err();
        assert!(err.source.is_io());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_stops_playback() {
        let (mut session, backend) = recorded(&[1, 2]);
        session.play().unwrap();
        let _ = session.save(|| None::<PathBuf>).unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!backend.output_running());
    }

    #[test]
    fn test_series_never_pruned_across_stop_and_play() {
        let (mut session, backend) = session();
        session.start_recording().unwrap();
        for _ in 0..5 {
            backend.deliver(&pcm(&[100, -100]));
        }
        session.stop_recording().unwrap();
        session.play().unwrap();
        session.stop_playing().unwrap();
        session.poll_events();

        let indexes: Vec<u64> = session.series().points().iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
    }
}
