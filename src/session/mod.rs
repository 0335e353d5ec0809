//! Live monitoring session for one camera.
//!
//! ```text
//! start(camera, threshold) ──▶ Channel::open ──Connected──▶ start_stream handshake
//!                                   │
//!                                   ▼ frame / error / connected
//!                          SessionController::poll()
//!                           ├─ foreign camera → dropped
//!                           ├─ LiveSnapshot (reading, alert, frame info)
//!                           └─ HistoryBuffer ──▶ project() ──▶ chart
//! ```
//!
//! The alert flag is relayed from the backend. The threshold is only a
//! request parameter carried by the handshake, so changing it in the
//! [`ConfigStore`] takes effect on the next `stop()` + `start()`.

mod config_store;
mod controller;
pub mod protocol;
mod snapshot;

pub use config_store::{clamp_threshold, ConfigStore, DEFAULT_THRESHOLD, THRESHOLD_STEP};
pub use controller::{SessionController, SessionState};
pub use snapshot::{FrameInfo, LiveSnapshot};
