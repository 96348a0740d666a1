#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use xcbench::application::engine::BenchEngine;
use xcbench::config::{BenchConfig, TimeoutPolicy};
use xcbench::domain::ports::{Acknowledgement, Gateway, Submission};
use xcbench::domain::transaction::CorrelationKey;
use xcbench::error::{BenchError, Result};
use xcbench::infrastructure::channel::ChannelEventSource;
use xcbench::infrastructure::in_memory::InMemoryLedger;

/// A confirmation frame as the gateway emits it for `key`.
pub fn change_frame(key: &CorrelationKey) -> String {
    json!({
        "type": "blockchain_event_received",
        "blockchainEvent": {
            "name": "Changed",
            "output": {"key": key.id_hex(), "value": key.payload_hex()}
        }
    })
    .to_string()
}

/// Config with short timings for paused-clock tests.
pub fn fast_config(target: u64) -> BenchConfig {
    BenchConfig::default()
        .with_target(target)
        .with_pacing(Duration::from_millis(10))
        .with_seed(5)
        .with_timeouts(TimeoutPolicy {
            tick: Duration::from_millis(100),
            per_transaction: Duration::from_secs(5),
            silence: Duration::from_secs(30),
            overall: Duration::from_secs(120),
        })
}

/// Mock gateway. Accepts submissions and echoes their confirmation onto
/// the feed, except for the first `fail` (rejected) and then the first
/// `drop` accepted ones (never confirmed).
pub struct ScriptedGateway {
    feed: Option<UnboundedSender<String>>,
    fail: usize,
    drop: usize,
    calls: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
}

impl ScriptedGateway {
    pub fn new(feed: Option<UnboundedSender<String>>) -> Self {
        Self {
            feed,
            fail: 0,
            drop: 0,
            calls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail = n;
        self
    }

    pub fn drop_first(mut self, n: usize) -> Self {
        self.drop = n;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn submit(&self, submission: &Submission) -> Result<Acknowledgement> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(submission.clone());

        if call < self.fail {
            return Err(BenchError::Submission("gateway returned 500".to_string()));
        }
        if call >= self.fail + self.drop
            && let Some(feed) = &self.feed
        {
            let _ = feed.send(change_frame(&submission.key));
        }
        Ok(Acknowledgement {
            status: 202,
            id: Some(submission.label.clone()),
        })
    }
}

pub struct Harness {
    pub engine: BenchEngine,
    pub ledger: Arc<InMemoryLedger>,
    pub gateway: Arc<ScriptedGateway>,
    /// Extra sender for frames pushed by the test itself.
    pub feed: UnboundedSender<String>,
}

/// Builds an engine over an in-memory ledger and one channel-fed event
/// source. `script` configures the gateway, which echoes onto the same
/// source.
pub fn harness(config: BenchConfig, script: impl FnOnce(ScriptedGateway) -> ScriptedGateway) -> Harness {
    let (source, feed) = ChannelEventSource::new("network");
    let ledger = Arc::new(InMemoryLedger::new());
    let gateway = Arc::new(script(ScriptedGateway::new(Some(feed.clone()))));
    let engine = BenchEngine::new(config, ledger.clone(), gateway.clone(), vec![Box::new(source)]);
    Harness {
        engine,
        ledger,
        gateway,
        feed,
    }
}

/// Reads one HTTP request and returns its request line and JSON body.
/// `None` if the client closed the connection first.
pub async fn read_http_request(stream: &mut TcpStream) -> Option<(String, Value)> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buffer).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().unwrap())
            })
            .unwrap_or(0);
        let body = &buffer[header_end + 4..];
        if body.len() >= content_length {
            let request_line = text.lines().next()?.to_string();
            return Some((request_line, serde_json::from_slice(body).ok()?));
        }
    }
}

/// A local gateway: an HTTP invoke endpoint that confirms every call by
/// publishing the matching change event to all websocket clients.
pub struct MockGateway {
    pub http: SocketAddr,
    pub ws: SocketAddr,
}

impl MockGateway {
    pub async fn start() -> Self {
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addrs = Self {
            http: http.local_addr().unwrap(),
            ws: ws.local_addr().unwrap(),
        };
        let (events, _) = broadcast::channel::<String>(256);

        let publisher = events.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = http.accept().await {
                let publisher = publisher.clone();
                tokio::spawn(async move {
                    let Some((_, body)) = read_http_request(&mut stream).await else {
                        return;
                    };
                    let args = &body["input"]["args"];
                    let frame = json!({
                        "type": "blockchain_event_received",
                        "blockchainEvent": {
                            "name": "Changed",
                            "output": {"key": args[0], "value": args[1]}
                        }
                    });
                    let reply = r#"{"id":"op"}"#;
                    let response = format!(
                        "HTTP/1.1 202 Accepted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                        reply.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                    let _ = publisher.send(frame.to_string());
                });
            }
        });

        tokio::spawn(async move {
            while let Ok((stream, _)) = ws.accept().await {
                let mut frames = events.subscribe();
                tokio::spawn(async move {
                    let Ok(mut socket) = accept_async(stream).await else {
                        return;
                    };
                    loop {
                        tokio::select! {
                            frame = frames.recv() => match frame {
                                Ok(frame) => {
                                    if socket.send(Message::text(frame)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                            incoming = socket.next() => match incoming {
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        addrs
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.http)
    }

    pub fn feed_url(&self) -> String {
        format!("ws://{}/ws", self.ws)
    }
}
