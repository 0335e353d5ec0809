//! Chart projection of the density history.
//!
//! Turns a history snapshot into index-aligned labels and two parallel
//! series (density value and person count) for rendering.

use std::fmt::Display;

use chrono::{Local, TimeZone};

use super::sample::DensitySample;

/// Name of the normalized density series.
pub const DENSITY_SERIES: &str = "density_value";
/// Name of the person count series.
pub const PERSON_SERIES: &str = "person_count";

/// One named series of chart points.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: &'static str,
    pub points: Vec<f64>,
}

impl Series {
    /// Points as `(x, y)` pairs where `x` is the sample index.
    pub fn xy(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, &y)| (i as f64, y))
            .collect()
    }

    /// Largest value in the series, or `None` when empty.
    pub fn max(&self) -> Option<f64> {
        self.points.iter().copied().reduce(f64::max)
    }
}

/// Chart-ready view of the history: time labels plus two series.
///
/// `labels`, `density` and `people` always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartProjection {
    pub labels: Vec<String>,
    pub density: Series,
    pub people: Series,
}

impl ChartProjection {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Both series in display order.
    pub fn series(&self) -> [&Series; 2] {
        [&self.density, &self.people]
    }
}

/// Project samples using local time-of-day labels.
pub fn project(samples: &[DensitySample]) -> ChartProjection {
    project_in(samples, &Local)
}

/// Project samples with labels rendered in the given time zone.
pub fn project_in<Tz>(samples: &[DensitySample], tz: &Tz) -> ChartProjection
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut labels = Vec::with_capacity(samples.len());
    let mut density = Vec::with_capacity(samples.len());
    let mut people = Vec::with_capacity(samples.len());

    for sample in samples {
        labels.push(
            sample
                .timestamp
                .with_timezone(tz)
                .format("%H:%M:%S")
                .to_string(),
        );
        density.push(sample.density_value);
        people.push(f64::from(sample.person_count));
    }

    ChartProjection {
        labels,
        density: Series {
            name: DENSITY_SERIES,
            points: density,
        },
        people: Series {
            name: PERSON_SERIES,
            points: people,
        },
    }
}
