//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::logging;
use crate::setup;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

/// A terminal microphone recorder with a live volume chart, playback and WAV export
#[derive(Parser)]
#[command(name = "mictape")]
#[command(version)]
#[command(about = "Record from the microphone, watch the volume, play it back and save it as WAV")]
#[command(long_about = "Record from the microphone, watch the volume, play it back and save it as WAV.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nKEYS (record):\n    r  start recording        s  stop recording\n    p  play                   x  stop playing\n    w  save as WAV            c  clear\n    q / Esc / Ctrl+C  quit\n\nEXAMPLES:\n    # Interactive session\n    $ mictape\n\n    # Record ten seconds without the UI\n    $ mictape capture -d 10 -o memo.wav\n\n    # Play it back\n    $ mictape play memo.wav\n\n    # Toggle recording from a keybinding\n    $ pkill -USR1 mictape")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/mictape/mictape.toml\n    Logs:               ~/.local/state/mictape/mictape.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive recording session (default)
    ///
    /// r records, s stops, p plays, x stops playback, w saves, c clears, q quits.
    /// Sending SIGUSR1 toggles recording.
    #[command(visible_alias = "r")]
    Record,

    /// Record for a fixed time without the UI and save a WAV file
    Capture {
        /// Recording length in seconds
        #[arg(short, long, value_name = "SECONDS", default_value_t = 5.0)]
        duration: f64,

        /// Destination WAV file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Play a WAV file recorded by mictape
    #[command(visible_alias = "p")]
    Play {
        /// Path to the WAV file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Open configuration file in your preferred editor
    ///
    /// Uses $VISUAL or $EDITOR, falling back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input and output devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the devices in mictape.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   mictape completions bash > mictape.bash
    ///   mictape completions zsh > _mictape
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Errors
/// - If setup fails
/// - If logging initialization fails
/// - If command execution fails
pub fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that don't need logging or config setup
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "mictape", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => return commands::handle_list_devices(),
        Some(Commands::Logs) => return commands::handle_logs(),
        _ => {}
    }

    logging::init_logging()?;
    setup::run_setup().map_err(|e| {
        tracing::error!("Setup failed: {e}");
        anyhow::anyhow!("Setup failed: {e}")
    })?;

    match cli.command {
        None | Some(Commands::Record) => commands::handle_record(),
        Some(Commands::Capture { duration, output }) => commands::handle_capture(duration, output),
        Some(Commands::Play { file }) => commands::handle_play(file),
        Some(Commands::Config) => commands::handle_config(),
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_record() {
        let cli = Cli::try_parse_from(["mictape"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_capture_arguments() {
        let cli = Cli::try_parse_from(["mictape", "capture", "-d", "2.5", "-o", "take.wav"]).unwrap();
        match cli.command {
            Some(Commands::Capture { duration, output }) => {
                assert_eq!(duration, 2.5);
                assert_eq!(output, PathBuf::from("take.wav"));
            }
            _ => panic!("expected capture"),
        }
        assert!(Cli::try_parse_from(["mictape", "capture"]).is_err());
    }
}
