use crate::config::FeedConfig;
use crate::domain::event::SubscriptionRequest;
use crate::domain::ports::{EventSource, FeedConnection, FeedConnectionBox};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, warn};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An event feed served over a websocket.
///
/// Connecting covers the handshake and the optional subscription frame,
/// both bounded by the feed's connect timeout.
pub struct WebSocketFeed {
    name: String,
    url: String,
    subscription: Option<SubscriptionRequest>,
    connect_timeout: Duration,
}

impl WebSocketFeed {
    pub fn new(config: &FeedConfig, namespace: &str, autoack: bool) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            subscription: config
                .subscription
                .as_ref()
                .map(|name| SubscriptionRequest::start(name.clone(), namespace, autoack)),
            connect_timeout: config.connect_timeout,
        }
    }

    fn connect_error(&self, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> BenchError {
        BenchError::FeedConnect {
            url: self.url.clone(),
            source: source.into(),
        }
    }

    async fn open(&self) -> Result<Stream> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| self.connect_error(e))?;
        info!(feed = %self.name, url = %self.url, "WebSocket connected");

        if let Some(request) = &self.subscription {
            let frame = serde_json::to_string(request)?;
            stream
                .send(Message::text(frame))
                .await
                .map_err(|e| self.connect_error(e))?;
            info!(feed = %self.name, subscription = %request.name, "Subscription started");
        }
        Ok(stream)
    }
}

#[async_trait]
impl EventSource for WebSocketFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<FeedConnectionBox> {
        let stream = timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| {
                warn!(feed = %self.name, url = %self.url, "WebSocket connect timed out");
                self.connect_error(format!("timed out after {:?}", self.connect_timeout))
            })??;

        Ok(Box::new(WebSocketConnection {
            name: self.name.clone(),
            stream,
        }))
    }
}

struct WebSocketConnection {
    name: String,
    stream: Stream,
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => {
                    let text: &str = &text;
                    return Ok(Some(text.to_owned()));
                }
                // Invalid UTF-8 still reaches the correlator and counts as malformed.
                Message::Binary(bytes) => return Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
                Message::Close(frame) => {
                    info!(feed = %self.name, ?frame, "WebSocket closed by gateway");
                    return Ok(None);
                }
                // Pongs are queued by tungstenite and flushed on the next read.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
