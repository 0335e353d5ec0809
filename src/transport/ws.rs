//! WebSocket connector.

use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Connector, Link, TransportError};

/// Connects to `ws://` or `wss://` endpoints, one envelope per text message.
///
/// Binary, ping and pong messages are ignored; a close message ends the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (socket, _response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect(format!("{endpoint}: {e}")))?;
        let (writer, reader) = socket.split();

        let frames = reader
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::WebSocket(e))),
                })
            });

        let texts = writer
            .sink_map_err(TransportError::WebSocket)
            .with(|frame: String| {
                future::ready(Ok::<_, TransportError>(Message::Text(frame.into())))
            });

        Ok(Link {
            sink: Box::pin(texts),
            stream: Box::pin(frames),
        })
    }
}
