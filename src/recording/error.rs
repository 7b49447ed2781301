//! Error types for the capture and playback pipeline.
//!
//! `AudioError` is the taxonomy every pipeline component reports with.
//! `ActionError` ties a failure to the session action that was attempted, so
//! the front-end can show one human-readable message per failed action.

use std::fmt;
use thiserror::Error;

/// Failure raised by a pipeline component.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The audio device could not be opened, configured or started.
    #[error("audio device error: {0}")]
    Device(String),
    /// Data is not a valid waveform stream, or a chunk is malformed.
    #[error("invalid audio data: {0}")]
    Format(String),
    /// The operation was invoked on a resource that does not exist (yet).
    #[error("{0}")]
    State(String),
    /// Writing the recording to disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    pub(crate) fn device(err: impl fmt::Display) -> Self {
        Self::Device(err.to_string())
    }

    pub(crate) fn format(err: impl fmt::Display) -> Self {
        Self::Format(err.to_string())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::Format(other.to_string()),
        }
    }
}

/// User-invocable session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    StartRecording,
    StopRecording,
    Play,
    StopPlaying,
    Save,
    Reset,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StartRecording => "start recording",
            Self::StopRecording => "stop recording",
            Self::Play => "play recording",
            Self::StopPlaying => "stop playback",
            Self::Save => "save recording",
            Self::Reset => "clear recording",
        };
        f.write_str(text)
    }
}

/// A failed session action together with its cause.
#[derive(Debug, Error)]
#[error("Failed to {action}: {source}")]
pub struct ActionError {
    pub action: SessionAction,
    #[source]
    pub source: AudioError,
}

impl ActionError {
    pub fn new(action: SessionAction, source: AudioError) -> Self {
        Self { action, source }
    }
}
