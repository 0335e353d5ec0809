//! Density data models, the rolling history window and its chart projection.
//!
//! ## Submodules
//!
//! - [`sample`]: Camera references, density readings and timestamped samples
//! - [`history`]: Bounded FIFO window of samples ([`HistoryBuffer`])
//! - [`chart`]: Pure projection of a history snapshot into chart series
//!
//! ## Data Flow
//!
//! ```text
//! frame event (density reading)
//!        │
//!        ▼
//! DensitySample::at(receipt time)
//!        │
//!        ▼
//! HistoryBuffer::append()  ──▶ snapshot() ──▶ chart::project()
//! ```

pub mod chart;
pub mod history;
pub mod sample;

pub use chart::{project, project_in, ChartProjection, Series, DENSITY_SERIES, PERSON_SERIES};
pub use history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
pub use sample::{parse_timestamp, CameraRef, DensityReading, DensitySample};
