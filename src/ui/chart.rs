//! Density history chart.
//!
//! Two stacked line charts share the time axis: density in `[0, 1]` on top,
//! person count (auto-scaled) below.

use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use crate::app::App;
use crate::data::{ChartProjection, Series};

/// Render the history chart panel.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let projection = app.controller.projection();
    let block = Block::default()
        .title(" Density History ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(app.theme.block_border());

    if projection.is_empty() {
        let paragraph = Paragraph::new("No data available yet")
            .style(Style::default().add_modifier(Modifier::DIM))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows =
        Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).split(inner);
    let labels = x_labels(&projection);

    let density_points = projection.density.xy();
    let density = series_chart(
        &density_points,
        "Density",
        [0.0, 1.0],
        vec!["0%".to_string(), "50%".to_string(), "100%".to_string()],
        &labels,
        Style::default().fg(app.theme.density_series),
    );
    frame.render_widget(density, rows[0]);

    let people_max = people_bound(&projection.people);
    let people_points = projection.people.xy();
    let people = series_chart(
        &people_points,
        "People",
        [0.0, people_max],
        vec![
            "0".to_string(),
            format!("{:.0}", people_max / 2.0),
            format!("{:.0}", people_max),
        ],
        &labels,
        Style::default().fg(app.theme.people_series),
    );
    frame.render_widget(people, rows[1]);
}

fn series_chart<'a>(
    points: &'a [(f64, f64)],
    title: &'a str,
    y_bounds: [f64; 2],
    y_labels: Vec<String>,
    x_labels: &[String],
    style: Style,
) -> Chart<'a> {
    let x_max = points.len().saturating_sub(1).max(1) as f64;
    let dataset = Dataset::default()
        .name(title)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(style)
        .data(points);

    Chart::new(vec![dataset])
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .labels(x_labels.iter().cloned().map(Span::from).collect::<Vec<_>>()),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled(title, style))
                .bounds(y_bounds)
                .labels(y_labels.into_iter().map(Span::from).collect::<Vec<_>>()),
        )
}

/// First, middle and last time labels.
fn x_labels(projection: &ChartProjection) -> Vec<String> {
    let labels = &projection.labels;
    match labels.len() {
        0 => Vec::new(),
        1 => vec![labels[0].clone()],
        2 => vec![labels[0].clone(), labels[1].clone()],
        n => vec![
            labels[0].clone(),
            labels[n / 2].clone(),
            labels[n - 1].clone(),
        ],
    }
}

/// Upper bound for the person-count axis, with headroom.
fn people_bound(series: &Series) -> f64 {
    let max = series.max().unwrap_or(0.0);
    (max * 1.2).ceil().max(5.0)
}
