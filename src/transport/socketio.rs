//! Socket.IO client transport (Engine.IO v4, Socket.IO v5) over WebSocket.
//!
//! `http://` and `https://` endpoints name a Socket.IO server. The connector
//! opens the Engine.IO WebSocket transport on that origin (path `/socket.io/`
//! unless the endpoint gives one), joins the default namespace and then maps
//! event packets to envelopes in both directions:
//!
//! ```text
//! 42["frame",{"camera_id":"cam-1"}]  <──▶  {"event":"frame","data":{"camera_id":"cam-1"}}
//! ```
//!
//! Server pings are answered inside the link. A server that stays silent for
//! longer than `pingInterval + pingTimeout` is treated as gone.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{sink, stream, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{Connector, Envelope, Link, TransportError};

/// Engine.IO path used when the endpoint names only an origin.
pub const DEFAULT_PATH: &str = "/socket.io/";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECT: &str = "40";
const DISCONNECT: &str = "41";
const PONG: &str = "3";

/// Session parameters from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenInfo {
    /// Longest silence tolerated before the server counts as gone.
    pub fn silence_limit(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// One decoded Engine.IO / Socket.IO text packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    /// The server accepted the namespace join.
    Connect,
    /// The server refused the namespace join.
    ConnectError(String),
    Disconnect,
    Event(Envelope),
    /// Acks, binary packets, upgrades, noops and other namespaces.
    Ignored,
}

impl Packet {
    /// Decode one text packet. Returns `None` if it is malformed.
    pub fn decode(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let kind = chars.next()?;
        let body = chars.as_str();
        match kind {
            '0' => serde_json::from_str(body).ok().map(Packet::Open),
            '1' => Some(Packet::Close),
            '2' => Some(Packet::Ping),
            '3' => Some(Packet::Pong),
            '4' => decode_message(body),
            '5' | '6' => Some(Packet::Ignored),
            _ => None,
        }
    }
}

/// Decode the Socket.IO packet carried by an Engine.IO message.
fn decode_message(packet: &str) -> Option<Packet> {
    let mut chars = packet.chars();
    let kind = chars.next()?;
    let mut body = chars.as_str();

    if body.starts_with('/') {
        let (namespace, rest) = body.split_once(',').unwrap_or((body, ""));
        if namespace != "/" {
            return Some(Packet::Ignored);
        }
        body = rest;
    }
    // Acknowledgement id
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => Some(Packet::Connect),
        '1' => Some(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => Some(Packet::ConnectError(connect_error_message(body))),
        '3' | '5' | '6' => Some(Packet::Ignored),
        _ => None,
    }
}

fn decode_event(body: &str) -> Option<Packet> {
    let Ok(Value::Array(args)) = serde_json::from_str(body) else {
        return None;
    };
    let mut args = args.into_iter();
    let Some(Value::String(event)) = args.next() else {
        return None;
    };
    let data = args.next().unwrap_or(Value::Null);
    Some(Packet::Event(Envelope::new(event, data)))
}

fn connect_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => body.to_string(),
        },
        Ok(Value::String(message)) => message,
        _ if body.is_empty() => "namespace join refused".to_string(),
        _ => body.to_string(),
    }
}

/// Encode an envelope as an event packet on the default namespace.
pub fn encode_event(envelope: &Envelope) -> Result<String, TransportError> {
    let args = if envelope.data.is_null() {
        json!([envelope.event])
    } else {
        json!([envelope.event, envelope.data])
    };
    Ok(format!("42{}", serde_json::to_string(&args)?))
}

/// WebSocket URL of the Engine.IO transport behind a Socket.IO address.
pub fn engine_url(endpoint: &str) -> Result<Url, TransportError> {
    let mut url =
        Url::parse(endpoint).map_err(|e| TransportError::Endpoint(format!("{endpoint}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::Endpoint(format!(
                "{endpoint}: '{other}' is not a Socket.IO scheme"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::Endpoint(format!("{endpoint}: cannot use {scheme}")))?;
    if url.path().trim_matches('/').is_empty() {
        url.set_path(DEFAULT_PATH);
    }
    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Connects to Socket.IO servers at `http://` or `https://` addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketIoConnector;

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let url = engine_url(endpoint)?;
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{endpoint}: {e}")))?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, socketio_link(socket))
            .await
            .map_err(|_| TransportError::Connect(format!("{endpoint}: handshake timed out")))?
    }
}

/// Join the default namespace on an open Engine.IO WebSocket and wrap it as
/// a [`Link`] carrying envelopes.
///
/// A writer task owns the socket's sending half. It leaves the namespace and
/// closes the socket once the link is dropped.
pub async fn socketio_link<S>(socket: WebSocketStream<S>) -> Result<Link, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut writer, mut reader) = socket.split();
    let (open, early) = handshake(&mut writer, &mut reader).await?;
    debug!(sid = %open.sid, "socket.io session open");

    let (packets, queued) = mpsc::unbounded_channel();
    tokio::spawn(write_packets(writer, queued));

    let inbound = Inbound {
        reader,
        packets: packets.clone(),
        early,
        silence: open.silence_limit(),
    };
    let frames = stream::unfold(inbound, |mut inbound| async move {
        let frame = inbound.next_frame().await?;
        Some((frame, inbound))
    });

    let events = sink::unfold(packets, |packets, frame: String| async move {
        let envelope = Envelope::decode(&frame).ok_or_else(|| {
            TransportError::Protocol(format!("outbound frame is not an envelope: {frame}"))
        })?;
        packets
            .send(encode_event(&envelope)?)
            .map_err(|_| TransportError::Closed)?;
        Ok::<_, TransportError>(packets)
    });

    Ok(Link {
        sink: Box::pin(events),
        stream: Box::pin(frames),
    })
}

/// Wait for the open packet, join the namespace and wait for the ack.
///
/// Events the server pushes before acknowledging the join are kept.
async fn handshake<S>(
    writer: &mut SplitSink<WebSocketStream<S>, Message>,
    reader: &mut SplitStream<WebSocketStream<S>>,
) -> Result<(OpenInfo, VecDeque<Envelope>), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut open = None;
    let mut early = VecDeque::new();

    loop {
        let text = match reader.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Connect(
                    "socket closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        match Packet::decode(text.as_str()) {
            Some(Packet::Open(info)) => {
                writer.send(text_message(CONNECT)).await?;
                open = Some(info);
            }
            Some(Packet::Connect) => {
                let info = open.ok_or_else(|| {
                    TransportError::Protocol("namespace ack before open packet".to_string())
                })?;
                return Ok((info, early));
            }
            Some(Packet::ConnectError(message)) => return Err(TransportError::Connect(message)),
            Some(Packet::Ping) => writer.send(text_message(PONG)).await?,
            Some(Packet::Event(envelope)) => early.push_back(envelope),
            Some(Packet::Close | Packet::Disconnect) => {
                return Err(TransportError::Connect(
                    "server ended the session during handshake".to_string(),
                ))
            }
            Some(Packet::Pong | Packet::Ignored) => {}
            None => debug!(packet = %text.as_str(), "dropping malformed packet"),
        }
    }
}

async fn write_packets<S>(
    mut writer: SplitSink<WebSocketStream<S>, Message>,
    mut packets: mpsc::UnboundedReceiver<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(packet) = packets.recv().await {
        if let Err(e) = writer.send(text_message(packet)).await {
            debug!(error = %e, "socket.io write failed");
            return;
        }
    }
    let _ = writer.send(text_message(DISCONNECT)).await;
    let _ = writer.close().await;
}

struct Inbound<S> {
    reader: SplitStream<WebSocketStream<S>>,
    packets: mpsc::UnboundedSender<String>,
    early: VecDeque<Envelope>,
    silence: Duration,
}

impl<S> Inbound<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Next event as an encoded envelope, or `None` once the server is done.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        if let Some(envelope) = self.early.pop_front() {
            return Some(envelope.encode());
        }

        loop {
            let message = match tokio::time::timeout(self.silence, self.reader.next()).await {
                Ok(Some(message)) => message,
                Ok(None) => return None,
                Err(_) => {
                    return Some(Err(TransportError::Protocol(format!(
                        "no ping from server in {:?}",
                        self.silence
                    ))))
                }
            };
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            };

            match Packet::decode(text.as_str()) {
                Some(Packet::Event(envelope)) => return Some(envelope.encode()),
                Some(Packet::Ping) => {
                    if self.packets.send(PONG.to_string()).is_err() {
                        return Some(Err(TransportError::Closed));
                    }
                }
                Some(Packet::Close | Packet::Disconnect) => return None,
                Some(_) => {}
                None => debug!(packet = %text.as_str(), "dropping malformed packet"),
            }
        }
    }
}

fn text_message(packet: impl Into<String>) -> Message {
    let packet: String = packet.into();
    Message::Text(packet.into())
}
