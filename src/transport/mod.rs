//! Push channel to the streaming backend.
//!
//! This module knows nothing about density or cameras. It moves JSON
//! envelopes (`{"event": ..., "data": ...}`) over a reconnecting connection
//! and reports lifecycle events to whoever owns the [`Channel`].
//!
//! ```text
//! Channel::open() ──spawn──▶ channel task ──Connector::connect()──▶ Link
//!      │                          │                                 │
//!      │ send()/close()           │◀──────── text frames ───────────┘
//!      ▼                          ▼
//!  command queue           ChannelEvent queue (owned by the handle)
//! ```
//!
//! Connectors:
//! - [`SocketIoConnector`] for `http://` and `https://` Socket.IO servers
//!   (event packets mapped to envelopes)
//! - [`WsConnector`] for `ws://` and `wss://` endpoints (one envelope per text message)
//! - [`TcpConnector`] for `tcp://host:port` endpoints (newline-delimited JSON)
//! - [`MemoryConnector`] for in-process pipes, used by tests and demos

mod channel;
mod lines;
mod memory;
mod socketio;
mod ws;

pub use channel::{Channel, ChannelEvent};
pub use lines::{line_link, line_link_with_limit, TcpConnector, MAX_LINE_BYTES};
pub use memory::{BackendPeer, MemoryBackend, MemoryConnector};
pub use socketio::{socketio_link, SocketIoConnector};
pub use ws::WsConnector;

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of reconnect attempts after a drop before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Errors raised by connectors and channels.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be understood.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// The remote side refused or could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer broke the framing protocol or went silent.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An outbound payload could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The channel has been closed or its task has ended.
    #[error("channel is closed")]
    Closed,
}

/// One message on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Decode a text frame. Returns `None` for anything that is not an envelope.
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outgoing half of a connection: accepts encoded text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
/// Incoming half of a connection: yields text frames until the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An established connection, split into its two directions.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens connections to an endpoint.
///
/// A channel calls `connect` once per attempt, including every reconnect.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}

/// Fixed-delay, bounded reconnection policy.
///
/// Applies once a connection has been established. A first connect that
/// fails is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnect attempts after a drop before giving up.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Pick a connector from the endpoint scheme.
pub fn connector_for(endpoint: &str) -> Result<Arc<dyn Connector>, TransportError> {
    let scheme = endpoint
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| TransportError::Endpoint(format!("missing scheme in {endpoint}")))?;

    match scheme.as_str() {
        "http" | "https" => Ok(Arc::new(SocketIoConnector)),
        "ws" | "wss" => Ok(Arc::new(WsConnector)),
        "tcp" => Ok(Arc::new(TcpConnector)),
        other => Err(TransportError::Endpoint(format!(
            "unsupported scheme '{other}' (expected http, https, ws, wss or tcp)"
        ))),
    }
}
