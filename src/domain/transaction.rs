use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Identifies a dispatched transaction by its identifier and payload bytes.
///
/// Both halves travel to the gateway as `0x`-prefixed hex and come back
/// in the `output.key` / `output.value` fields of the confirmation event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl CorrelationKey {
    pub fn new(id: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Rebuilds a key from the hex strings carried by an event.
    ///
    /// Returns `None` if either half is not valid hex.
    pub fn from_hex(id: &str, payload: &str) -> Option<Self> {
        Some(Self {
            id: decode_hex(id)?,
            payload: decode_hex(payload)?,
        })
    }

    pub fn id_hex(&self) -> String {
        encode_hex(&self.id)
    }

    pub fn payload_hex(&self) -> String {
        encode_hex(&self.payload)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id_hex(), self.payload_hex())
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(digits).ok()
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    #[serde(rename = "timedout")]
    TimedOut,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::TimedOut => "timedout",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation applied when a record leaves `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A confirmation event matched the record.
    Complete { event: serde_json::Value },
    /// The submission call itself failed.
    Fail { reason: String },
    /// A timeout policy gave up on the record.
    TimeOut,
}

impl Transition {
    pub fn target(&self) -> TransactionStatus {
        match self {
            Transition::Complete { .. } => TransactionStatus::Completed,
            Transition::Fail { .. } => TransactionStatus::Failed,
            Transition::TimeOut => TransactionStatus::TimedOut,
        }
    }
}

/// A single dispatched transaction and its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub key: CorrelationKey,
    /// Textual transaction identifier sent as `txId`.
    pub label: String,
    pub status: TransactionStatus,
    pub dispatch_time: Instant,
    pub end_time: Option<Instant>,
    pub elapsed: Option<Duration>,
    pub matched_event: Option<serde_json::Value>,
    pub failure: Option<String>,
}

impl TransactionRecord {
    pub fn pending(key: CorrelationKey, label: impl Into<String>, dispatch_time: Instant) -> Self {
        Self {
            key,
            label: label.into(),
            status: TransactionStatus::Pending,
            dispatch_time,
            end_time: None,
            elapsed: None,
            matched_event: None,
            failure: None,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.dispatch_time)
    }

    /// Moves a `Pending` record to the transition's terminal status.
    ///
    /// Returns `false` and leaves the record untouched if it already left
    /// `Pending`.
    pub fn apply(&mut self, transition: Transition, now: Instant) -> bool {
        if self.status != TransactionStatus::Pending {
            return false;
        }

        self.status = transition.target();
        self.end_time = Some(now);
        self.elapsed = Some(self.age(now));
        match transition {
            Transition::Complete { event } => self.matched_event = Some(event),
            Transition::Fail { reason } => self.failure = Some(reason),
            Transition::TimeOut => {}
        }
        true
    }
}
