//! Notifications sent from the audio threads to the session.

use super::error::AudioError;
use std::sync::mpsc;

/// Something that happened on an audio callback thread.
#[derive(Debug)]
pub enum SessionEvent {
    /// Normalized volume of one captured chunk
    Volume(f32),
    /// The playback stream ran out of samples
    PlaybackFinished,
    /// A failure the audio thread could not report any other way
    Error(AudioError),
}

pub type EventSender = mpsc::Sender<SessionEvent>;
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel()
}
