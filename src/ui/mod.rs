//! Terminal UI rendering using ratatui.
//!
//! ## Submodules
//!
//! - [`monitor`]: Live feed panel, density stats and session sidebar
//! - [`chart`]: Stacked density / person-count history charts
//! - [`settings`]: Modal overlay for editing the alert threshold
//! - [`common`]: Shared components (header, alert banner, status bar, help overlay)
//! - [`theme`]: Light/dark theme support with terminal auto-detection
//!
//! ## Rendering Architecture
//!
//! The main loop in `main.rs` lays out the screen and calls into these modules:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ Header (common::render_header)                      │
//! ├─────────────────────────────────────────────────────┤
//! │ Alert banner (common::render_alert_banner, if any)  │
//! ├──────────────────────────────────────┬──────────────┤
//! │ Live feed (monitor::render_feed)     │ Session      │
//! │ Stats (monitor::render_stats)        │ sidebar      │
//! │ History (chart::render)              │              │
//! ├──────────────────────────────────────┴──────────────┤
//! │ Status Bar (common::render_status_bar)              │
//! └─────────────────────────────────────────────────────┘
//!         ↑
//!    Overlays rendered on top:
//!    - settings::render_overlay
//!    - common::render_help
//! ```

pub mod chart;
pub mod common;
pub mod monitor;
pub mod settings;
pub mod theme;

pub use theme::Theme;
