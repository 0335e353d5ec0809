//! Live feed, density stats and session sidebar.

use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::common::format_bytes;
use crate::app::App;
use crate::session::SessionState;

fn panel<'a>(app: &App, title: &'a str) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(app.theme.block_border())
}

/// Render the live feed panel.
///
/// Frames are not decoded; the panel shows what arrived and when.
pub fn render_feed(frame: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.controller.snapshot();
    let dim = Style::default().add_modifier(Modifier::DIM);

    let lines = match (app.state(), snapshot.frame) {
        (SessionState::Idle | SessionState::Error, _) => vec![
            Line::from(""),
            Line::from(Span::styled("Stream not started", Style::default().add_modifier(Modifier::BOLD))),
            Line::from(Span::styled("Press s to start monitoring", dim)),
        ],
        (SessionState::Connecting, None) => vec![
            Line::from(""),
            Line::from(Span::styled(
                "Connecting to stream...",
                Style::default().fg(app.theme.warning),
            )),
        ],
        (_, frame_info) => {
            let last_frame = match frame_info {
                Some(info) => format!(
                    "{} at {}",
                    format_bytes(info.bytes),
                    info.received_at.with_timezone(&Local).format("%H:%M:%S")
                ),
                None => "no image yet".to_string(),
            };
            vec![
                Line::from(""),
                Line::from(vec![
                    Span::raw("Frames received  "),
                    Span::styled(
                        snapshot.frames_received.to_string(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(vec![Span::raw("Last frame       "), Span::raw(last_frame)]),
            ]
        }
    };

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(panel(app, " Live Feed "));
    frame.render_widget(paragraph, area);
}

/// Render people, density and per-m² figures while a session runs.
pub fn render_stats(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(area);

    let snapshot = app.controller.snapshot();
    let running = app.controller.is_running();
    let values = [
        ("People Count", snapshot.reading.person_count.to_string()),
        ("Density", format!("{:.1}%", snapshot.density_percent())),
        ("Per m²", format!("{:.2}", snapshot.reading.density_per_sqm)),
    ];

    for ((title, value), column) in values.into_iter().zip(columns.iter()) {
        let style = if !running {
            Style::default().add_modifier(Modifier::DIM)
        } else if snapshot.alert {
            app.theme.alert_style(true)
        } else {
            Style::default().fg(app.theme.highlight).add_modifier(Modifier::BOLD)
        };
        let value = if running { value } else { "–".to_string() };
        let paragraph = Paragraph::new(Line::from(Span::styled(value, style)))
            .alignment(Alignment::Center)
            .block(panel(app, title));
        frame.render_widget(paragraph, *column);
    }
}

/// Render the session status sidebar.
pub fn render_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let snapshot = app.controller.snapshot();
    let label = |text: &str| Span::styled(format!("{text:<11}"), Style::default().add_modifier(Modifier::DIM));

    let mut lines = vec![
        Line::from(vec![
            label("Status"),
            Span::styled(state.label(), app.theme.state_style(state)),
        ]),
        Line::from(vec![
            label("Threshold"),
            Span::raw(format!("{:.0}%", app.config.threshold() * 100.0)),
        ]),
    ];

    if let Some(active) = app.controller.session_threshold() {
        if (active - app.config.threshold()).abs() > f64::EPSILON {
            lines.push(Line::from(vec![
                label("  in use"),
                Span::styled(
                    format!("{:.0}% (restart to apply)", active * 100.0),
                    Style::default().fg(app.theme.warning),
                ),
            ]));
        }
    }

    let (alert_text, alert_style) = if !app.controller.is_running() {
        ("–", Style::default().add_modifier(Modifier::DIM))
    } else if snapshot.alert {
        ("ALERT", app.theme.alert_style(true))
    } else {
        ("Normal", app.theme.alert_style(false))
    };
    lines.push(Line::from(vec![label("Alert"), Span::styled(alert_text, alert_style)]));
    lines.push(Line::from(vec![
        label("History"),
        Span::raw(format!(
            "{}/{}",
            app.controller.history().len(),
            app.controller.history().capacity()
        )),
    ]));
    if let Some(updated) = snapshot.updated_at {
        lines.push(Line::from(vec![
            label("Updated"),
            Span::raw(updated.with_timezone(&Local).format("%H:%M:%S").to_string()),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        label("Camera ID"),
        Span::styled(app.camera.id.clone(), Style::default().add_modifier(Modifier::DIM)),
    ]));

    let paragraph = Paragraph::new(lines).block(panel(app, " Session "));
    frame.render_widget(paragraph, area);
}
