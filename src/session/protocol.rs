//! Event names and payload shapes spoken with the streaming backend.

use serde::{Deserialize, Serialize};

use crate::data::DensityReading;
use crate::transport::Envelope;

/// Outbound: open a stream for a camera.
pub const START_STREAM: &str = "start_stream";
/// Outbound: stop the stream for a camera.
pub const STOP_STREAM: &str = "stop_stream";
/// Inbound: informational greeting after connect.
pub const CONNECTED: &str = "connected";
/// Inbound: frame and measurement for a camera.
pub const FRAME: &str = "frame";
/// Inbound: backend-side failure.
pub const ERROR: &str = "error";

/// Handshake sent after every connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub camera_id: String,
    pub threshold: f64,
}

/// Notice sent before closing the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopNotice {
    pub camera_id: String,
}

/// Frame/measurement payload. Every field but `camera_id` is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FramePayload {
    pub camera_id: String,
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default)]
    pub density: Option<DensityReading>,
    #[serde(default)]
    pub alert: Option<bool>,
}

/// Optional human-readable message attached to `connected` and `error`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoticePayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub camera_id: Option<String>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connected(NoticePayload),
    Frame(FramePayload),
    Error(NoticePayload),
}

/// Why an inbound envelope was not understood.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejected {
    UnknownEvent(String),
    BadPayload { event: String, reason: String },
}

impl Inbound {
    /// Interpret an envelope. Missing payloads on notices are treated as empty.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, Rejected> {
        let Envelope { event, data } = envelope;
        let bad = |event: &str, e: serde_json::Error| Rejected::BadPayload {
            event: event.to_string(),
            reason: e.to_string(),
        };

        match event.as_str() {
            FRAME => serde_json::from_value(data)
                .map(Inbound::Frame)
                .map_err(|e| bad(&event, e)),
            CONNECTED | ERROR => {
                let notice = if data.is_null() {
                    NoticePayload::default()
                } else if let Some(text) = data.as_str() {
                    NoticePayload {
                        message: Some(text.to_string()),
                        camera_id: None,
                    }
                } else {
                    serde_json::from_value(data).map_err(|e| bad(&event, e))?
                };
                if event == CONNECTED {
                    Ok(Inbound::Connected(notice))
                } else {
                    Ok(Inbound::Error(notice))
                }
            }
            _ => Err(Rejected::UnknownEvent(event)),
        }
    }
}
