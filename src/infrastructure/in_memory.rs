use crate::domain::ports::Ledger;
use crate::domain::snapshot::{LedgerSnapshot, StatusCounts};
use crate::domain::transaction::{CorrelationKey, TransactionRecord, TransactionStatus, Transition};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

type RecordCell = Arc<Mutex<TransactionRecord>>;

#[derive(Default)]
struct Entries {
    order: Vec<RecordCell>,
    index: HashMap<CorrelationKey, RecordCell>,
}

/// A thread-safe in-memory transaction ledger.
///
/// The map itself sits behind an `RwLock` that is only held for lookup and
/// insertion. Each record has its own `Mutex`, so competing transitions on
/// one record serialize while other records stay uncontended.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryLedger {
    /// Creates a new, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, key: &CorrelationKey) -> Option<RecordCell> {
        let entries = self.entries.read().await;
        entries.index.get(key).cloned()
    }

    async fn cells(&self) -> Vec<RecordCell> {
        let entries = self.entries.read().await;
        entries.order.clone()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn insert(&self, record: TransactionRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.index.contains_key(&record.key) {
            return Err(BenchError::DuplicateKey(record.key.to_string()));
        }
        let key = record.key.clone();
        let cell = Arc::new(Mutex::new(record));
        entries.order.push(cell.clone());
        entries.index.insert(key, cell);
        Ok(())
    }

    async fn try_transition(
        &self,
        key: &CorrelationKey,
        transition: Transition,
        now: Instant,
    ) -> Result<bool> {
        let Some(cell) = self.cell(key).await else {
            return Ok(false);
        };
        let mut record = cell.lock().await;
        Ok(record.apply(transition, now))
    }

    async fn get(&self, key: &CorrelationKey) -> Result<Option<TransactionRecord>> {
        match self.cell(key).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn pending(&self, now: Instant) -> Result<Vec<(CorrelationKey, Duration)>> {
        let mut pending = Vec::new();
        for cell in self.cells().await {
            let record = cell.lock().await;
            if record.status == TransactionStatus::Pending {
                pending.push((record.key.clone(), record.age(now)));
            }
        }
        Ok(pending)
    }

    async fn counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for cell in self.cells().await {
            counts.record(cell.lock().await.status);
        }
        Ok(counts)
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let mut records = Vec::new();
        for cell in self.cells().await {
            records.push(cell.lock().await.clone());
        }
        Ok(LedgerSnapshot::new(records))
    }
}
