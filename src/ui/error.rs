//! Full-screen error display for failures that happen before or outside the
//! session TUI, such as an unreadable config file.

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::time::Duration;

const ERROR_BG: Color = Color::Rgb(255, 0, 0);
const ERROR_FG: Color = Color::Rgb(255, 255, 255);

/// Red screen with a centered message, dismissed by any key.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    cleaned_up: bool,
}

impl ErrorScreen {
    /// Creates a new error screen and enters alternate screen mode.
    ///
    /// # Errors
    /// - If raw mode cannot be enabled
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(ErrorScreen {
            terminal,
            cleaned_up: false,
        })
    }

    /// Shows `title` above `detail` and waits for a key press.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn show_error(&mut self, title: &str, detail: &str) -> anyhow::Result<()> {
        let lines = message_lines(title, detail);

        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                frame.render_widget(
                    Paragraph::new("").style(Style::default().bg(ERROR_BG)),
                    area,
                );

                let height = (lines.len() as u16).min(area.height);
                let centered_area = Rect {
                    x: area.x + area.width / 10,
                    y: area.y + area.height.saturating_sub(height) / 2,
                    width: (area.width * 80) / 100,
                    height: area.height.saturating_sub(area.height.saturating_sub(height) / 2),
                };

                let paragraph = Paragraph::new(lines.clone())
                    .style(Style::default().fg(ERROR_FG).bg(ERROR_BG))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true });
                frame.render_widget(paragraph, centered_area);
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    break;
                }
            }
        }

        Ok(())
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

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Shows an error screen and restores the terminal afterwards.
pub fn show_error_screen(title: &str, detail: &str) -> anyhow::Result<()> {
    let mut screen = ErrorScreen::new()?;
    screen.show_error(title, detail)?;
    screen.cleanup()
}

fn message_lines(title: &str, detail: &str) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    lines.extend(detail.lines().map(|line| Line::from(line.to_string())));
    lines.push(Line::from(""));
    lines.push(Line::from("Press any key to exit"));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lines_layout() {
        let lines = message_lines("Configuration Error", "bad value\nsecond line");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].to_string(), "Configuration Error");
        assert_eq!(lines[2].to_string(), "bad value");
        assert_eq!(lines[3].to_string(), "second line");
        assert_eq!(lines[5].to_string(), "Press any key to exit");
    }
}
