//! Terminal user interface for the recording session.
//!
//! Shows the volume history as a sparkline, a footer with the session state,
//! recorded duration and current level, and a status line for errors. Keys are
//! mapped to [`UserCommand`]s; the caller applies them to the session.

use crate::recording::device::AudioBackend;
use crate::recording::session::{RecordingSession, SessionState};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Sparkline},
};
use std::io::{stdout, Stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

const BG: Color = Color::Rgb(0, 0, 0);
const FG: Color = Color::Rgb(206, 224, 220);
const HELP_FG: Color = Color::Rgb(100, 100, 100);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A key press translated into a session action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// No key pressed, or an unbound one
    Continue,
    StartRecording,
    StopRecording,
    Play,
    StopPlaying,
    Save,
    Clear,
    /// Leave the session (q, Escape, Ctrl+C)
    Quit,
}

/// Maps a key to its command.
pub fn command_for_key(code: KeyCode, modifiers: KeyModifiers) -> UserCommand {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => UserCommand::Quit,
        KeyCode::Char('q') | KeyCode::Esc => UserCommand::Quit,
        KeyCode::Char('r') => UserCommand::StartRecording,
        KeyCode::Char('s') => UserCommand::StopRecording,
        KeyCode::Char('p') => UserCommand::Play,
        KeyCode::Char('x') => UserCommand::StopPlaying,
        KeyCode::Char('w') => UserCommand::Save,
        KeyCode::Char('c') => UserCommand::Clear,
        _ => UserCommand::Continue,
    }
}

/// Scales normalized volumes into sparkline bar heights.
pub fn chart_data(values: impl Iterator<Item = f32>, scale: f32) -> Vec<u64> {
    values
        .map(|v| (v * scale).max(0.0).round() as u64)
        .collect()
}

#[derive(Debug, Clone)]
enum Status {
    Info(String),
    Error(String),
}

/// Terminal UI bound to the alternate screen for the life of the session.
pub struct SessionTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// Multiplier applied to normalized volume for display
    volume_scale: f32,
    /// Upper bound of the sparkline, in scaled units
    chart_max: u64,
    status: Option<Status>,
    cleaned_up: bool,
}

impl SessionTui {
    /// Creates the UI and enters alternate screen mode.
    ///
    /// # Errors
    /// - If raw mode cannot be enabled
    /// - If the terminal cannot be initialized
    pub fn new(volume_scale: f32, chart_max: u64) -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            volume_scale,
            chart_max: chart_max.max(1),
            status: None,
            cleaned_up: false,
        })
    }

    /// Replaces the status line with an error message.
    pub fn show_error(&mut self, message: impl Into<String>) {
        self.status = Some(Status::Error(message.into()));
    }

    pub fn show_info(&mut self, message: impl Into<String>) {
        self.status = Some(Status::Info(message.into()));
    }

    /// Draws one frame from the session's current state.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render<B: AudioBackend>(&mut self, session: &RecordingSession<B>) -> anyhow::Result<()> {
        let width = self.terminal.size()?.width as usize;
        let data = chart_data(session.series().tail(width), self.volume_scale);
        let level = session.volume_level() * self.volume_scale;
        let state = session.state();
        let duration = session.recorded_duration();
        let chart_max = self.chart_max;
        let status = self.status.clone();

        self.terminal.draw(|frame| {
            let area = frame.area();
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(1),
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Length(1),
                ])
                .split(area);

            let sparkline = Sparkline::default()
                .data(&data)
                .max(chart_max)
                .style(Style::default().bg(BG).fg(FG));
            frame.render_widget(sparkline, layout[0]);

            let secs = duration.as_secs();
            let footer = Line::from(vec![
                state_indicator(state),
                Span::raw(format!("{state}  ")),
                Span::raw(format!("{}:{:02}", secs / 60, secs % 60)),
                Span::raw(" / "),
                Span::raw(format!("{level:.0}")),
            ]);
            frame.render_widget(
                Paragraph::new(footer).style(Style::default().fg(FG).bg(BG)),
                layout[1],
            );

            let help = "r record, s stop, p play, x stop playing, w save, c clear, q quit";
            frame.render_widget(
                Paragraph::new(help).style(Style::default().fg(HELP_FG).bg(BG)),
                layout[2],
            );

            let status_line = match &status {
                Some(Status::Error(message)) => {
                    Paragraph::new(message.as_str()).style(Style::default().fg(Color::Red).bg(BG))
                }
                Some(Status::Info(message)) => {
                    Paragraph::new(message.as_str()).style(Style::default().fg(FG).bg(BG))
                }
                None => Paragraph::new("").style(Style::default().bg(BG)),
            };
            frame.render_widget(status_line, layout[3]);
        })?;

        Ok(())
    }

    /// Waits briefly for a key press and returns the matching command.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self) -> anyhow::Result<UserCommand> {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(UserCommand::Continue);
                }
                let command = command_for_key(key.code, key.modifiers);
                if command != UserCommand::Continue {
                    tracing::debug!("Key {:?} mapped to {:?}", key.code, command);
                }
                return Ok(command);
            }
        }
        Ok(UserCommand::Continue)
    }

    /// Asks for a destination path, pre-filled with `suggested`.
    ///
    /// Enter accepts the entered path, Escape cancels. Returns `None` on
    /// cancel or when the path is left blank.
    ///
    /// # Errors
    /// - If terminal rendering or event polling fails
    pub fn prompt_destination(&mut self, suggested: &Path) -> anyhow::Result<Option<PathBuf>> {
        let mut input = Input::new(suggested.display().to_string());

        loop {
            let value = input.value().to_string();
            let cursor = input.visual_cursor();
            self.terminal.draw(|frame| {
                let area = frame.area();
                let prompt_area = Rect {
                    x: area.x + area.width / 10,
                    y: area.y + area.height.saturating_sub(3) / 2,
                    width: (area.width * 80) / 100,
                    height: 3.min(area.height),
                };
                frame.render_widget(Clear, prompt_area);

                let block = Block::default()
                    .title(" Save as (Enter to save, Esc to cancel) ")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(FG).bg(BG));
                let inner = block.inner(prompt_area);
                frame.render_widget(block, prompt_area);
                frame.render_widget(Paragraph::new(value.as_str()), inner);
                frame.set_cursor_position(Position::new(inner.x + cursor as u16, inner.y));
            })?;

            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            let ev = event::read()?;
            if let Event::Key(key) = &ev {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => {
                        let value = input.value().trim();
                        return Ok((!value.is_empty()).then(|| PathBuf::from(value)));
                    }
                    KeyCode::Esc => return Ok(None),
                    _ => {}
                }
            }
            input.handle_event(&ev);
        }
    }

    /// Restores the terminal. Safe to call more than once.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    /// - If cursor cannot be shown
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for SessionTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn state_indicator(state: SessionState) -> Span<'static> {
    match state {
        SessionState::Recording => Span::styled("● ", Style::default().fg(Color::Red)),
        SessionState::Playing => Span::styled("▶ ", Style::default().fg(Color::Green)),
        SessionState::Stopped => Span::styled("■ ", Style::default().fg(Color::Yellow)),
        SessionState::Idle => Span::styled("○ ", Style::default().fg(HELP_FG)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        let none = KeyModifiers::NONE;
        assert_eq!(command_for_key(KeyCode::Char('r'), none), UserCommand::StartRecording);
        assert_eq!(command_for_key(KeyCode::Char('s'), none), UserCommand::StopRecording);
        assert_eq!(command_for_key(KeyCode::Char('p'), none), UserCommand::Play);
        assert_eq!(command_for_key(KeyCode::Char('x'), none), UserCommand::StopPlaying);
        assert_eq!(command_for_key(KeyCode::Char('w'), none), UserCommand::Save);
        assert_eq!(command_for_key(KeyCode::Char('c'), none), UserCommand::Clear);
        assert_eq!(command_for_key(KeyCode::Esc, none), UserCommand::Quit);
        assert_eq!(command_for_key(KeyCode::Char('z'), none), UserCommand::Continue);
    }

    #[test]
    fn test_ctrl_c_quits_instead_of_clearing() {
        assert_eq!(
            command_for_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            UserCommand::Quit
        );
    }

    #[test]
    fn test_chart_data_scales_volume() {
        let data = chart_data([0.5, 0.0, 0.0123].into_iter(), 1000.0);
        assert_eq!(data, vec![500, 0, 12]);
    }
}
