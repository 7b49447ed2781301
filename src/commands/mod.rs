//! Application command handlers for mictape.
//!
//! # Commands
//! - `record`: Interactive recording session (default)
//! - `capture`: Headless timed recording to a WAV file
//! - `play`: Play a saved WAV file
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List available audio input and output devices
//! - `logs`: Display recent log entries

pub mod capture;
pub mod config;
pub mod list_devices;
pub mod logs;
pub mod play;
pub mod record;

pub use capture::handle_capture;
pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use play::handle_play;
pub use record::handle_record;
