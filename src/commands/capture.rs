//! Headless recording to a WAV file.

use crate::commands::record::open_session;
use crate::config::MictapeConfig;
use crate::recording::SessionEvent;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Records from the configured microphone for `seconds` and writes the take to
/// `output`. Ctrl+C ends the recording early and still saves it.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If recording cannot start
/// - If the file cannot be written
pub fn handle_capture(seconds: f64, output: PathBuf) -> anyhow::Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        anyhow::bail!("Duration must be a positive number of seconds");
    }
    let config = MictapeConfig::load()?;
    let mut session = open_session(&config);

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    session.start_recording()?;
    eprintln!("Recording for {seconds:.1}s to {} (Ctrl+C to stop early)", output.display());

    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
    while Instant::now() < deadline && !interrupted.load(Ordering::Relaxed) {
        std::thread::sleep(POLL_INTERVAL);
        for event in session.poll_events() {
            if let SessionEvent::Error(e) = event {
                eprintln!("Warning: {e}");
            }
        }
    }

    // Without an output device the take is still kept and saved.
    if let Err(e) = session.stop_recording() {
        tracing::warn!("{e}");
        eprintln!("Warning: {e}");
    }
    session.save_to(&output)?;

    println!(
        "Saved {} ({:.1}s)",
        output.display(),
        session.recorded_duration().as_secs_f32()
    );
    Ok(())
}
