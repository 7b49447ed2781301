//! Configuration file editor command.

use crate::config::{self, MictapeConfig};
use std::process::Command;

/// Fallback editors, tried in order when $VISUAL and $EDITOR are unset.
const FALLBACK_EDITORS: [&str; 2] = ["nano", "vi"];

/// Opens the mictape configuration file in the user's preferred editor and
/// checks that it still parses afterwards.
///
/// # Errors
/// - If no editor can be found or executed
/// - If the editor exits unsuccessfully
pub fn handle_config() -> anyhow::Result<()> {
    let config_path = config::config_path()?;
    tracing::info!("Opening config file: {}", config_path.display());

    let (program, args) = resolve_editor(
        std::env::var("VISUAL").ok(),
        std::env::var("EDITOR").ok(),
        is_editor_available,
    )?;
    tracing::debug!("Using editor: {} {:?}", program, args);

    let status = Command::new(&program)
        .args(&args)
        .arg(&config_path)
        .status()
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open editor '{program}': {e}. Make sure the editor is installed and accessible."
            )
        })?;

    if !status.success() {
        anyhow::bail!(
            "Editor exited with error code: {}",
            status.code().unwrap_or(-1)
        );
    }

    match MictapeConfig::load_from(&config_path) {
        Ok(_) => tracing::info!("Config file edited successfully"),
        Err(e) => {
            tracing::warn!("Edited config does not parse: {e}");
            eprintln!("Warning: {e}");
            eprintln!("mictape will not start until {} is fixed.", config_path.display());
        }
    }
    Ok(())
}

/// Picks the editor command: $VISUAL, then $EDITOR (either may carry
/// arguments, e.g. `code --wait`), then the first available fallback.
fn resolve_editor(
    visual: Option<String>,
    editor: Option<String>,
    available: impl Fn(&str) -> bool,
) -> anyhow::Result<(String, Vec<String>)> {
    let from_env = [visual, editor]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty());

    if let Some(value) = from_env {
        let mut parts = value.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            return Ok((program, parts.collect()));
        }
    }

    FALLBACK_EDITORS
        .iter()
        .find(|candidate| available(candidate))
        .map(|candidate| (candidate.to_string(), Vec::new()))
        .ok_or_else(|| anyhow::anyhow!("No editor found. Please set the $EDITOR environment variable."))
}

/// Checks if an editor is available in the system PATH.
fn is_editor_available(editor: &str) -> bool {
    Command::new("which")
        .arg(editor)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_wins_over_editor() {
        let (program, args) =
            resolve_editor(Some("code --wait".into()), Some("vim".into()), |_| false).unwrap();
        assert_eq!(program, "code");
        assert_eq!(args, vec!["--wait".to_string()]);
    }

    #[test]
    fn test_blank_variables_fall_back() {
        let (program, args) =
            resolve_editor(Some("  ".into()), None, |name| name == "vi").unwrap();
        assert_eq!(program, "vi");
        assert!(args.is_empty());
    }

    #[test]
    fn test_no_editor_is_error() {
        assert!(resolve_editor(None, None, |_| false).is_err());
    }
}
