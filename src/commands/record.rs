//! Interactive recording session.
//!
//! Runs the TUI loop: keys become session actions, audio events feed the
//! volume chart, failures are shown on the status line and never end the
//! session. SIGUSR1 toggles recording from outside (e.g. a window manager
//! keybinding).

use crate::config::MictapeConfig;
use crate::recording::{
    AudioBackend, AudioFormat, CpalBackend, RecordingSession, SaveOutcome, SessionEvent,
    SessionState, SessionTui, UserCommand,
};
use crate::ui::show_error_screen;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Builds a session on the configured devices.
pub fn open_session(config: &MictapeConfig) -> RecordingSession<CpalBackend> {
    let backend = CpalBackend::new(
        config.audio.input_device.clone(),
        config.audio.output_device.clone(),
    );
    RecordingSession::new(backend, AudioFormat::mono(config.audio.sample_rate))
}

/// Runs the interactive recorder until the user quits.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the terminal cannot be driven
pub fn handle_record() -> Result<(), anyhow::Error> {
    tracing::info!("=== mictape session started ===");

    let config = match MictapeConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            show_error_screen(
                "Configuration Error",
                &format!("{err}\n\nPlease check your ~/.config/mictape/mictape.toml file and try again."),
            )?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: input={}, output={}, sample_rate={}Hz",
        config.audio.input_device,
        config.audio.output_device,
        config.audio.sample_rate
    );

    let mut session = open_session(&config);
    let mut tui = SessionTui::new(config.display.volume_scale, config.display.chart_max)?;

    let toggle = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&toggle))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    tui.show_info("Press r to start recording");
    loop {
        for event in session.poll_events() {
            if let SessionEvent::Error(e) = event {
                tui.show_error(e.to_string());
            }
        }
        tui.render(&session)?;

        let command = if toggle.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: toggling recording");
            toggle_command(session.state())
        } else {
            tui.handle_input()?
        };

        if command == UserCommand::Quit {
            break;
        }
        apply_command(&mut session, &mut tui, &config, command)?;
    }

    session.reset();
    tui.cleanup()?;
    tracing::info!("=== mictape session ended ===");
    Ok(())
}

/// What an external toggle means in the current state.
fn toggle_command(state: SessionState) -> UserCommand {
    match state {
        SessionState::Recording => UserCommand::StopRecording,
        _ => UserCommand::StartRecording,
    }
}

/// Applies one command, reporting its outcome on the status line.
///
/// Only terminal failures are returned; action failures are displayed.
fn apply_command<B: AudioBackend>(
    session: &mut RecordingSession<B>,
    tui: &mut SessionTui,
    config: &MictapeConfig,
    command: UserCommand,
) -> anyhow::Result<()> {
    let result = match command {
        UserCommand::Continue | UserCommand::Quit => return Ok(()),
        UserCommand::StartRecording => session.start_recording(),
        UserCommand::StopRecording => session.stop_recording(),
        UserCommand::Play => session.play(),
        UserCommand::StopPlaying => session.stop_playing(),
        UserCommand::Clear => {
            session.reset();
            Ok(())
        }
        UserCommand::Save => {
            let suggested = config.suggested_save_path();
            let mut prompt_error = None;
            let saved = session.save(|| match tui.prompt_destination(&suggested) {
                Ok(destination) => destination,
                Err(e) => {
                    prompt_error = Some(e);
                    None
                }
            });
            if let Some(e) = prompt_error {
                return Err(e);
            }
            match saved {
                Ok(SaveOutcome::Saved(path)) => {
                    tui.show_info(format!("Saved {}", path.display()));
                    return Ok(());
                }
                Ok(SaveOutcome::Cancelled) => {
                    tui.show_info("Save cancelled");
                    return Ok(());
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => tui.show_info(status_after(command)),
        Err(e) => tui.show_error(e.to_string()),
    }
    Ok(())
}

fn status_after(command: UserCommand) -> &'static str {
    match command {
        UserCommand::StartRecording => "Recording, press s to stop",
        UserCommand::StopRecording => "Stopped, press p to play or w to save",
        UserCommand::Play => "Playing, press x to stop",
        UserCommand::StopPlaying => "Playback stopped",
        UserCommand::Clear => "Cleared",
        _ => "",
    }
}
