// Library crate: public API items may not be used by the binary
#![allow(unused)]

//! # crowdwatch
//!
//! A terminal client and library for live crowd-density monitoring.
//!
//! The backend inference service analyses a camera's video and pushes frame
//! and density events over a streaming channel. This crate opens and tears
//! down that session, validates what arrives, keeps a bounded rolling
//! history and projects it into chart series for display in a TUI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Application                          │
//! │  ┌─────────┐    ┌──────────┐    ┌─────────┐    ┌─────────┐  │
//! │  │  app    │───▶│ session  │───▶│   ui    │───▶│ Terminal│  │
//! │  │ (state) │    │(controller)   │(rendering)   │         │  │
//! │  └────┬────┘    └────┬─────┘    └─────────┘    └─────────┘  │
//! │       │              │                                      │
//! │       ▼              ▼                                      │
//! │  ┌─────────┐    ┌──────────┐                                │
//! │  │   api   │    │transport │◀── SocketIo | Ws | Tcp         │
//! │  │ (REST)  │    │(channel) │    | MemoryConnector           │
//! │  └─────────┘    └──────────┘                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`transport`]**: Reconnecting push [`Channel`](transport::Channel) over a
//!   pluggable [`Connector`](transport::Connector)
//! - **[`session`]**: The [`SessionController`] state machine, the
//!   [`ConfigStore`] and the live snapshot
//! - **[`data`]**: Density samples, the [`HistoryBuffer`] and the chart projection
//! - **[`api`]**: Camera and density-history lookups with explicit credentials
//! - **[`settings`]**: Layered configuration (defaults, file, environment, CLI)
//! - **[`app`]**, **[`events`]**, **[`ui`]**: The terminal monitoring view
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Monitor camera "cam-1" against a local backend
//! crowdwatch cam-1 --api-url http://localhost:5000 --stream-url http://localhost:5000
//!
//! # Use a config file and start streaming right away
//! crowdwatch cam-1 --config crowdwatch.toml --start
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use crowdwatch::session::SessionState;
//! use crowdwatch::transport::{MemoryConnector, RetryPolicy};
//! use crowdwatch::SessionController;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let (connector, mut backend) = MemoryConnector::create();
//! let mut controller = SessionController::new(
//!     Arc::new(connector),
//!     "memory://stream",
//!     RetryPolicy::default(),
//!     100,
//! );
//!
//! controller.start("cam-1", 0.65);
//! let mut peer = backend.accept().await.unwrap();
//!
//! // Connected: the controller sends its handshake.
//! controller.next_event().await;
//! assert_eq!(peer.recv().await.unwrap().event, "start_stream");
//!
//! peer.emit("frame", json!({
//!     "camera_id": "cam-1",
//!     "density": {"person_count": 12, "density_value": 0.4, "density_per_sqm": 0.8},
//!     "alert": false
//! })).await.unwrap();
//! controller.next_event().await;
//!
//! assert_eq!(controller.state(), SessionState::Active);
//! assert_eq!(controller.snapshot().reading.person_count, 12);
//! assert_eq!(controller.history().len(), 1);
//! # });
//! ```

pub mod api;
pub mod app;
pub mod data;
pub mod events;
pub mod session;
pub mod settings;
pub mod transport;
pub mod ui;

// Re-export main types for convenience
pub use api::{ApiClient, ApiError, AuthContext};
pub use app::App;
pub use data::{project, CameraRef, ChartProjection, DensityReading, DensitySample, HistoryBuffer};
pub use session::{ConfigStore, LiveSnapshot, SessionController, SessionState};
pub use settings::{Settings, SettingsError};
pub use transport::{connector_for, Channel, ChannelEvent, Connector, RetryPolicy, TransportError};
