//! Current density and alert state for display.

use chrono::{DateTime, Utc};

use crate::data::DensityReading;

/// Metadata about the latest video frame.
///
/// Frames are not decoded; only their size and arrival time are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Decoded size of the base64 payload in bytes.
    pub bytes: usize,
    pub received_at: DateTime<Utc>,
}

impl FrameInfo {
    pub fn from_base64(encoded: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            bytes: decoded_len(encoded),
            received_at,
        }
    }
}

/// Live view of the running session.
///
/// `alert` is relayed verbatim from the backend, which alone evaluates the
/// threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSnapshot {
    pub reading: DensityReading,
    pub alert: bool,
    pub frame: Option<FrameInfo>,
    pub frames_received: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LiveSnapshot {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Density as a percentage for display.
    pub fn density_percent(&self) -> f64 {
        self.reading.density_value * 100.0
    }
}

fn decoded_len(encoded: &str) -> usize {
    let encoded = encoded.trim();
    let padding = encoded.bytes().rev().take_while(|&b| b == b'=').count();
    (encoded.len() / 4 * 3).saturating_sub(padding)
}
