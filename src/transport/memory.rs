//! In-process connector backed by tokio duplex pipes.
//!
//! The [`MemoryBackend`] side plays the streaming service: it accepts each
//! connection the [`MemoryConnector`] opens and can push and read envelopes
//! on it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use super::{line_link, Connector, Envelope, Link, TransportError};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
struct Shared {
    peers: mpsc::UnboundedSender<DuplexStream>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

/// Connector that hands the far end of every connection to a [`MemoryBackend`].
///
/// Clones share the same backend and counters.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Create a connector and the backend that accepts its connections.
    pub fn create() -> (Self, MemoryBackend) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                peers: tx,
                refusing: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            }),
        };
        (connector, MemoryBackend { incoming: rx })
    }

    /// Refuse every subsequent connect attempt.
    pub fn refuse_all(&self) {
        self.shared.refusing.store(true, Ordering::SeqCst);
    }

    /// Accept connect attempts again.
    pub fn accept_all(&self) {
        self.shared.refusing.store(false, Ordering::SeqCst);
    }

    /// Number of connect attempts made so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{endpoint}: refused")));
        }

        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.shared
            .peers
            .send(server)
            .map_err(|_| TransportError::Connect(format!("{endpoint}: backend is gone")))?;
        Ok(line_link(client))
    }
}

/// Accepting side of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryBackend {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryBackend {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<BackendPeer> {
        self.incoming.recv().await.map(BackendPeer::new)
    }

    /// Take an already-opened connection, if any.
    pub fn try_accept(&mut self) -> Option<BackendPeer> {
        self.incoming.try_recv().ok().map(BackendPeer::new)
    }
}

/// Backend end of one in-memory connection.
#[derive(Debug)]
pub struct BackendPeer {
    link: Link,
}

impl BackendPeer {
    fn new(io: DuplexStream) -> Self {
        Self {
            link: line_link(io),
        }
    }

    /// Push an envelope to the client.
    pub async fn emit(
        &mut self,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), TransportError> {
        let frame = Envelope::new(event, data).encode()?;
        self.link.sink.send(frame).await
    }

    /// Push a raw line, well-formed or not.
    pub async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.link.sink.send(line.to_string()).await
    }

    /// Next envelope from the client. `None` once the client hangs up.
    pub async fn recv(&mut self) -> Option<Envelope> {
        while let Some(frame) = self.link.stream.next().await {
            if let Some(envelope) = frame.ok().as_deref().and_then(Envelope::decode) {
                return Some(envelope);
            }
        }
        None
    }
}
