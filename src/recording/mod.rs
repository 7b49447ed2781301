//! Microphone recording, playback and saving.
//!
//! Audio arrives on the audio subsystem's threads and is handed to the
//! [`RecordingSession`] through an event channel; the session itself is owned
//! and driven by a single thread (the TUI loop or a headless command).

pub mod buffer;
pub mod capture;
pub mod device;
pub mod error;
pub mod events;
pub mod playback;
pub mod session;
pub mod ui;
pub mod volume;

pub use buffer::AudioFormat;
pub use device::{AudioBackend, CpalBackend};
pub use events::SessionEvent;
pub use playback::AudioPlayback;
pub use session::{RecordingSession, SaveOutcome, SessionState};
pub use ui::{SessionTui, UserCommand};
