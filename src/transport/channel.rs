//! Reconnecting push channel.
//!
//! A [`Channel`] owns a background task that connects, pumps frames in both
//! directions and reconnects after drops according to a [`RetryPolicy`].
//! A first connect that fails is terminal: there is no session to resume.
//! Lifecycle events land on a queue owned by the handle, so once the handle
//! is closed or dropped nothing the old connection produces can be observed.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{Connector, Envelope, Link, RetryPolicy, TransportError};

/// Lifecycle and message events emitted by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A connection was established (initially or after a reconnect).
    Connected,
    /// An inbound envelope, in the order the backend sent it.
    Message(Envelope),
    /// An established connection dropped; a reconnect will follow.
    Disconnected { reason: String },
    /// A reconnect attempt is scheduled after the policy delay.
    Reconnecting { attempt: u32 },
    /// The first connect failed or retries are exhausted. The channel task
    /// has ended.
    Failed { message: String },
}

enum Command {
    Send(String),
    Close,
}

/// Handle to one reconnecting connection.
#[derive(Debug)]
pub struct Channel {
    endpoint: String,
    commands: mpsc::UnboundedSender<Command>,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    task: Option<JoinHandle<()>>,
}

impl Channel {
    /// Start connecting in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(connector: Arc<dyn Connector>, endpoint: &str, policy: RetryPolicy) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(
            connector,
            endpoint.to_string(),
            policy,
            command_rx,
            event_tx,
        ));

        Self {
            endpoint: endpoint.to_string(),
            commands: command_tx,
            events: Some(event_rx),
            task: Some(task),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }

    /// Queue an outbound envelope.
    ///
    /// Frames queued while the connection is down are dropped.
    pub fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = Envelope::new(event, payload).encode()?;
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| TransportError::Closed)
    }

    /// Next pending event, without waiting.
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    /// Wait for the next event. Returns `None` once the channel is closed
    /// or its task has ended and every event has been consumed.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.as_mut()?.recv().await
    }

    /// Close the connection and stop any pending reconnect.
    ///
    /// Already-queued frames are flushed first when connected. Closing twice
    /// is a no-op.
    pub fn close(&mut self) {
        if self.events.take().is_none() {
            return;
        }
        let _ = self.commands.send(Command::Close);
        // The task observes Close (or the dropped event queue) and exits on
        // its own; the handle only detaches from it.
        self.task.take();
        debug!(endpoint = %self.endpoint, "channel closed");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

enum LinkEnd {
    Closed,
    Dropped(String),
}

async fn run(
    connector: Arc<dyn Connector>,
    endpoint: String,
    policy: RetryPolicy,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut failures: u32 = 0;
    let mut connected_once = false;

    loop {
        let attempt = {
            let connect = connector.connect(&endpoint);
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break result,
                    command = commands.recv() => match command {
                        Some(Command::Send(_)) => debug!(%endpoint, "dropping frame while connecting"),
                        Some(Command::Close) | None => return,
                    },
                }
            }
        };

        let reason = match attempt {
            Ok(mut link) => {
                connected_once = true;
                failures = 0;
                info!(%endpoint, "channel connected");
                if events.send(ChannelEvent::Connected).is_err() {
                    let _ = link.sink.close().await;
                    return;
                }
                match pump(&mut link, &mut commands, &events).await {
                    LinkEnd::Closed => {
                        let _ = link.sink.close().await;
                        return;
                    }
                    LinkEnd::Dropped(reason) => {
                        warn!(%endpoint, %reason, "channel dropped");
                        if events
                            .send(ChannelEvent::Disconnected {
                                reason: reason.clone(),
                            })
                            .is_err()
                        {
                            return;
                        }
                        reason
                    }
                }
            }
            Err(e) if !connected_once => {
                warn!(%endpoint, error = %e, "initial connect failed");
                let _ = events.send(ChannelEvent::Failed {
                    message: format!("cannot connect to {endpoint}: {e}"),
                });
                return;
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "reconnect attempt failed");
                e.to_string()
            }
        };

        failures += 1;
        if failures > policy.max_attempts {
            let message = format!(
                "gave up on {endpoint} after {} attempts: {reason}",
                policy.max_attempts
            );
            warn!(%endpoint, "{message}");
            let _ = events.send(ChannelEvent::Failed { message });
            return;
        }

        if events
            .send(ChannelEvent::Reconnecting { attempt: failures })
            .is_err()
        {
            return;
        }
        if !wait_or_close(&mut commands, Instant::now() + policy.delay).await {
            return;
        }
    }
}

/// Move frames until the link ends or the owner closes the channel.
async fn pump(
    link: &mut Link,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> LinkEnd {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = link.sink.send(frame).await {
                        return LinkEnd::Dropped(e.to_string());
                    }
                }
                Some(Command::Close) | None => return LinkEnd::Closed,
            },
            inbound = link.stream.next() => match inbound {
                Some(Ok(text)) => match Envelope::decode(&text) {
                    Some(envelope) => {
                        if events.send(ChannelEvent::Message(envelope)).is_err() {
                            return LinkEnd::Closed;
                        }
                    }
                    None => debug!(frame = %text, "dropping malformed frame"),
                },
                Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                None => return LinkEnd::Dropped("connection closed by peer".to_string()),
            },
        }
    }
}

/// Sleep until `deadline`. Returns `false` if the channel was closed meanwhile.
async fn wait_or_close(commands: &mut mpsc::UnboundedReceiver<Command>, deadline: Instant) -> bool {
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return true,
            command = commands.recv() => match command {
                Some(Command::Send(_)) => debug!("dropping frame while reconnecting"),
                Some(Command::Close) | None => return false,
            },
        }
    }
}
