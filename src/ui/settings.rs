//! Settings overlay for the alert threshold.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, Paragraph},
    Frame,
};

use super::common::centered_rect;
use crate::app::App;

/// Render the settings modal on top of the current view.
pub fn render_overlay(frame: &mut Frame, app: &App, area: Rect) {
    let Some(draft) = app.settings_draft else {
        return;
    };

    let overlay = centered_rect(50, 11, area);
    let block = Block::default()
        .title(" Monitoring Settings ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));
    let inner = block.inner(overlay);

    frame.render_widget(Clear, overlay);
    frame.render_widget(block, overlay);

    let rows = Layout::vertical([
        Constraint::Length(1), // Label
        Constraint::Length(1), // Gauge
        Constraint::Length(1),
        Constraint::Min(2), // Notes
        Constraint::Length(1), // Keys
    ])
    .split(inner);

    let threshold = draft.threshold();
    frame.render_widget(
        Paragraph::new(Line::from(format!(
            "Alert Threshold: {:.0}%",
            threshold * 100.0
        )))
        .style(app.theme.header),
        rows[0],
    );
    frame.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(app.theme.highlight))
            .ratio(threshold.clamp(0.0, 1.0))
            .label(""),
        rows[1],
    );

    let mut notes = vec![Line::from(
        "Alert is triggered when crowd density exceeds this threshold.",
    )];
    if app.controller.is_running() {
        notes.push(Line::from("Saving restarts the running stream."));
    }
    frame.render_widget(
        Paragraph::new(notes)
            .style(Style::default().add_modifier(Modifier::DIM))
            .wrap(ratatui::widgets::Wrap { trim: true }),
        rows[3],
    );
    frame.render_widget(
        Paragraph::new("←/→ adjust   Enter save   Esc cancel"),
        rows[4],
    );
}
