//! WebSocket connector backed by `tokio-tungstenite`

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::TransportError;
use super::socket::{Connector, FrameSink, FrameSource, SocketHalves, SocketMessage};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens `ws://` and `wss://` connections
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketHalves, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(Message::Pong(data))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Socket(e.to_string()))),
            };

            let converted = match message {
                Message::Text(text) => SocketMessage::Text(text.to_string()),
                Message::Binary(data) => SocketMessage::Binary(data.to_vec()),
                Message::Ping(data) => SocketMessage::Ping(data.to_vec()),
                Message::Pong(data) => SocketMessage::Pong(data.to_vec()),
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    SocketMessage::Close { code, reason }
                }
                // Raw frames are never yielded while reading
                Message::Frame(_) => continue,
            };
            return Some(Ok(converted));
        }
    }
}
