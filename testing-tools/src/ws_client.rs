use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Writer = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub data: Value,
    pub timestamp: Instant,
}

pub struct Connection {
    pub label: String,
    writer: Writer,
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

/// Turns an `http(s)://` base URL into the matching `ws(s)://` endpoint.
pub fn ws_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("{base}/ws")
    }
}

impl Connection {
    pub async fn establish(base_url: &str, label: String) -> Result<Self> {
        let url = ws_url(base_url);
        let (socket, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to open WebSocket to {url}"))?;
        let (writer, mut reader) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_label = label.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(data) = serde_json::from_str::<Value>(text.as_str()) else {
                            warn!("Unparseable frame for {}: {}", reader_label, text.as_str());
                            continue;
                        };
                        let event = Event {
                            kind: data["type"].as_str().unwrap_or_default().to_string(),
                            data,
                            timestamp: Instant::now(),
                        };

                        if tx.send(event).is_err() {
                            debug!("WebSocket receiver dropped for {}", reader_label);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket stream ended for {}", reader_label);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore ping/pong and binary frames
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", reader_label, e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            writer,
            event_rx: rx,
            _handle: handle,
        })
    }

    pub async fn send_envelope(&mut self, envelope: &Value) -> Result<()> {
        self.writer
            .send(Message::text(envelope.to_string()))
            .await
            .with_context(|| format!("Failed to send envelope for {}", self.label))
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer
            .send(Message::Close(None))
            .await
            .context("Failed to send close frame")
    }

    pub async fn wait_for_event(&mut self, kind: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", kind);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.kind == kind => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Wrong event type, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("WebSocket connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", kind);
                }
            }
        }
    }
}
