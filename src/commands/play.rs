//! Plays a saved WAV file through the configured output device.

use crate::config::MictapeConfig;
use crate::recording::{events, AudioPlayback, CpalBackend, SessionEvent};
use anyhow::anyhow;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

/// Plays `file` to the end, or until Ctrl+C.
///
/// Only mono 16-bit PCM files, such as those mictape writes, are supported.
///
/// # Errors
/// - If the file cannot be read or is not a supported WAV file
/// - If the output device cannot be opened
pub fn handle_play(file: PathBuf) -> anyhow::Result<()> {
    let config = MictapeConfig::load()?;
    let bytes = fs::read(&file).map_err(|e| anyhow!("Failed to read {}: {e}", file.display()))?;

    let backend = CpalBackend::new(
        config.audio.input_device.clone(),
        config.audio.output_device.clone(),
    );
    let (tx, rx) = events::channel();
    let mut playback = AudioPlayback::new(&bytes, &backend, tx)
        .map_err(|e| anyhow!("Cannot play {}: {e}", file.display()))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .map_err(|e| anyhow!("Failed to register signal handler: {e}"))?;

    playback.play()?;
    eprintln!(
        "Playing {} ({:.1}s)",
        file.display(),
        playback.duration().as_secs_f32()
    );

    loop {
        if interrupted.load(Ordering::Relaxed) {
            playback.stop()?;
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(SessionEvent::PlaybackFinished) => break,
            Ok(SessionEvent::Error(e)) => {
                playback.stop()?;
                return Err(e.into());
            }
            Ok(SessionEvent::Volume(_)) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("Finished playing {}", file.display());
    Ok(())
}
