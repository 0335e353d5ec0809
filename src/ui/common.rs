//! Common UI components.
//!
//! This module contains the header bar, alert banner, status bar, and help overlay.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;

/// Render the header bar with camera and session state.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let line = Line::from(vec![
        Span::styled(" ● ", app.theme.state_style(state)),
        Span::styled("CROWDWATCH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(
            app.camera.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" │ "),
        Span::styled(
            app.camera.location_label().to_string(),
            Style::default().add_modifier(Modifier::DIM),
        ),
        Span::raw(" │ "),
        Span::styled(state.label(), app.theme.state_style(state)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Whether the overcrowding banner should be shown.
pub fn alert_visible(app: &App) -> bool {
    app.controller.is_running() && app.controller.snapshot().alert
}

/// Render the overcrowding banner.
pub fn render_alert_banner(frame: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.controller.snapshot();
    let threshold = app
        .controller
        .session_threshold()
        .unwrap_or(app.config.threshold());
    let text = format!(
        " ⚠ OVERCROWDING ALERT: density {:.1}% exceeds threshold {:.0}% ",
        snapshot.density_percent(),
        threshold * 100.0
    );
    let paragraph = Paragraph::new(text)
        .style(app.theme.alert_style(true).add_modifier(Modifier::REVERSED))
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

/// Render the status bar at the bottom.
///
/// Temporary status messages take precedence over the key hints.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = if app.settings_draft.is_some() {
        "←/→:adjust Enter:save Esc:cancel"
    } else if app.controller.is_running() {
        "s:stop t:settings c:clear ?:help q:quit"
    } else {
        "s:start t:settings c:clear ?:help q:quit"
    };

    let status = format!(
        " {} | {} samples | {}",
        app.controller.endpoint(),
        app.controller.history().len(),
        controls
    );
    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the current view.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        Line::from(vec![Span::styled(
            " Stream",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  s / Space   Start or stop streaming"),
        Line::from("  c           Clear density history"),
        Line::from(""),
        Line::from(vec![Span::styled(
            " Settings",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  t           Open settings"),
        Line::from("  ←/→ h/l     Adjust alert threshold"),
        Line::from("  Enter       Save (restarts stream)"),
        Line::from("  Esc         Cancel"),
        Line::from(""),
        Line::from(vec![Span::styled(
            " General",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  ?           Toggle help"),
        Line::from("  q           Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);
    let help_area = centered_rect(44, 21, area);

    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}

/// A `width` x `height` rectangle centered in `area`, shrunk to fit.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

/// Format a byte count for display (e.g., 1234 -> "1.2 KB").
pub fn format_bytes(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.1} MB", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1} KB", n as f64 / 1_000.0)
    } else {
        format!("{n} B")
    }
}
