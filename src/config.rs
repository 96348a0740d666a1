//! Run configuration.
//!
//! Defaults mirror the reference deployment: a primary gateway on port 5000,
//! a peer network gateway on port 5003, and a `Changed` event listener in
//! the `default` namespace.

use crate::error::{BenchError, Result};
use std::time::Duration;

/// How to reach the gateway's contract-invocation API.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://localhost:5000/api/v1`.
    pub base_url: String,
    pub namespace: String,
    /// Registered contract API name.
    pub api: String,
    /// Contract function invoked for every transaction.
    pub method: String,
    pub invocation_id: String,
    pub network_id: String,
    pub primary_network_id: String,
    /// Timeout for a single submission round-trip.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api/v1".to_string(),
            namespace: "default".to_string(),
            api: "cross-chain".to_string(),
            method: "doCross".to_string(),
            invocation_id: "iv-1".to_string(),
            network_id: "20".to_string(),
            primary_network_id: "10".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn invoke_url(&self) -> String {
        format!(
            "{}/namespaces/{}/apis/{}/invoke/{}",
            self.base_url.trim_end_matches('/'),
            self.namespace,
            self.api,
            self.method
        )
    }
}

/// One event-feed connection.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Name used in logs.
    pub name: String,
    pub url: String,
    /// Subscription to start on connect. `None` sends no control frame.
    pub subscription: Option<String>,
    /// Bound on the handshake plus the subscription frame.
    pub connect_timeout: Duration,
}

impl FeedConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            subscription: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// The three timeout policies and the tick they are evaluated on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub tick: Duration,
    /// A pending record older than this is timed out and replaced.
    pub per_transaction: Duration,
    /// With pending records and no frame for this long, the run aborts.
    pub silence: Duration,
    /// Hard wall-clock limit for the run.
    pub overall: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            per_transaction: Duration::from_secs(30),
            silence: Duration::from_secs(60),
            overall: Duration::from_secs(3000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Number of completed transactions the run aims for.
    pub target: u64,
    /// Delay between two initial submissions.
    pub pacing: Duration,
    /// Width of the random payload in bytes.
    pub payload_len: usize,
    /// Seed for the transaction generator. Random if unset.
    pub seed: Option<u64>,
    pub timeouts: TimeoutPolicy,
    /// Frame `type` carrying ledger changes.
    pub frame_kind: String,
    /// Event name emitted by the benchmarked contract function.
    pub event_name: String,
    /// Namespace sent in subscription control frames.
    pub namespace: String,
    pub autoack: bool,
    pub gateway: GatewayConfig,
    pub feeds: Vec<FeedConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            target: 50,
            pacing: Duration::from_millis(100),
            payload_len: 2,
            seed: None,
            timeouts: TimeoutPolicy::default(),
            frame_kind: "blockchain_event_received".to_string(),
            event_name: "Changed".to_string(),
            namespace: "default".to_string(),
            autoack: true,
            gateway: GatewayConfig::default(),
            feeds: vec![
                FeedConfig::new("primary", "ws://localhost:5000/ws"),
                FeedConfig::new("network", "ws://localhost:5003/ws").with_subscription("Changed"),
            ],
        }
    }
}

impl BenchConfig {
    pub fn with_target(mut self, target: u64) -> Self {
        self.target = target;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_feeds(mut self, feeds: Vec<FeedConfig>) -> Self {
        self.feeds = feeds;
        self
    }

    /// Rejects parameters the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target == 0 {
            return Err(BenchError::Config("target must be at least 1".to_string()));
        }
        if self.payload_len == 0 {
            return Err(BenchError::Config(
                "payload length must be at least 1 byte".to_string(),
            ));
        }
        let t = &self.timeouts;
        for (name, value) in [
            ("pacing", self.pacing),
            ("tick", t.tick),
            ("per-transaction timeout", t.per_transaction),
            ("silence timeout", t.silence),
            ("overall timeout", t.overall),
        ] {
            if value.is_zero() {
                return Err(BenchError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.feeds.is_empty() {
            return Err(BenchError::Config(
                "at least one event feed is required".to_string(),
            ));
        }
        if let Some(feed) = self.feeds.iter().find(|f| f.connect_timeout.is_zero()) {
            return Err(BenchError::Config(format!(
                "connect timeout of feed {} must be non-zero",
                feed.name
            )));
        }
        Ok(())
    }
}
