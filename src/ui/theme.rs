//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::session::SessionState;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Color for the connecting state.
    pub warning: Color,
    /// Color for alerts and failures.
    pub critical: Color,
    /// Color for the live state and normal density.
    pub healthy: Color,
    /// Color for borders and separators.
    pub border: Color,
    /// Line color of the density series.
    pub density_series: Color,
    /// Line color of the person-count series.
    pub people_series: Color,
    /// Style for panel titles.
    pub header: Style,
    /// Border style (rounded, plain, etc.).
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::Gray,
            density_series: Color::LightBlue,
            people_series: Color::LightGreen,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::DarkGray,
            density_series: Color::Blue,
            people_series: Color::Green,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Style for a session state badge.
    pub fn state_style(&self, state: SessionState) -> Style {
        match state {
            SessionState::Idle => Style::default().add_modifier(Modifier::DIM),
            SessionState::Connecting => Style::default().fg(self.warning),
            SessionState::Active => Style::default().fg(self.healthy).add_modifier(Modifier::BOLD),
            SessionState::Error => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
        }
    }

    /// Style for the Normal/Alert indicator.
    pub fn alert_style(&self, alert: bool) -> Style {
        if alert {
            Style::default().fg(self.critical).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.healthy)
        }
    }

    pub fn block_border(&self) -> Style {
        Style::default().fg(self.border)
    }
}
