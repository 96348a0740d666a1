use serde::{Deserialize, Serialize};

/// A frame pushed by the gateway over the event feed.
///
/// Only the frame kind and the event body are inspected; everything else is
/// ignored. The event body is kept raw so it can be stored on the matched
/// record.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedFrame {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "blockchainEvent", alias = "event", default)]
    pub event: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChangeOutput {
    pub key: String,
    pub value: String,
}

/// The part of a ledger-change event used for correlation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LedgerChange {
    pub name: String,
    pub output: ChangeOutput,
}

impl FeedFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Extracts the change carried by this frame if it has the expected
    /// kind and event name.
    pub fn ledger_change(&self, kind: &str, event_name: &str) -> Option<LedgerChange> {
        if self.kind.as_deref() != Some(kind) {
            return None;
        }
        let change: LedgerChange = serde_json::from_value(self.event.clone()?).ok()?;
        (change.name == event_name).then_some(change)
    }
}

/// Control frame sent on connect to start a subscription.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub namespace: String,
    pub autoack: bool,
}

impl SubscriptionRequest {
    pub fn start(name: impl Into<String>, namespace: impl Into<String>, autoack: bool) -> Self {
        Self {
            kind: "start",
            name: name.into(),
            namespace: namespace.into(),
            autoack,
        }
    }
}
