use super::snapshot::{LedgerSnapshot, StatusCounts};
use super::transaction::{CorrelationKey, TransactionRecord, Transition};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Append-only store of transaction records.
///
/// Records are never removed. The only mutation after insertion is
/// [`Ledger::try_transition`], which is atomic per record.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Inserts a new record. Fails with `DuplicateKey` if the key exists.
    async fn insert(&self, record: TransactionRecord) -> Result<()>;

    /// Applies `transition` if the record is still `Pending`.
    ///
    /// Returns whether this call moved the record. Unknown keys return
    /// `false`.
    async fn try_transition(
        &self,
        key: &CorrelationKey,
        transition: Transition,
        now: Instant,
    ) -> Result<bool>;

    async fn get(&self, key: &CorrelationKey) -> Result<Option<TransactionRecord>>;

    /// Keys and ages of all records still `Pending`, in insertion order.
    async fn pending(&self, now: Instant) -> Result<Vec<(CorrelationKey, Duration)>>;

    async fn counts(&self) -> Result<StatusCounts>;

    async fn snapshot(&self) -> Result<LedgerSnapshot>;
}

/// A write call to hand to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub label: String,
    pub key: CorrelationKey,
}

/// Synchronous acceptance of a submission. Says nothing about completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub status: u16,
    pub id: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<Acknowledgement>;
}

/// An open event-feed connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Waits for the next text frame. `None` means the feed closed.
    async fn next_frame(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Something that can open an event-feed connection.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<FeedConnectionBox>;
}

pub type SharedLedger = Arc<dyn Ledger>;
pub type SharedGateway = Arc<dyn Gateway>;
pub type EventSourceBox = Box<dyn EventSource>;
pub type FeedConnectionBox = Box<dyn FeedConnection>;
