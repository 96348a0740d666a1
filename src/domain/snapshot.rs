use super::transaction::{TransactionRecord, TransactionStatus};
use serde::Serialize;

/// Number of ledger records in each status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: TransactionStatus) {
        match status {
            TransactionStatus::Pending => self.pending += 1,
            TransactionStatus::Completed => self.completed += 1,
            TransactionStatus::Failed => self.failed += 1,
            TransactionStatus::TimedOut => self.timed_out += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.completed + self.failed + self.timed_out
    }
}

/// Immutable point-in-time copy of the ledger, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    records: Vec<TransactionRecord>,
}

impl LedgerSnapshot {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in &self.records {
            counts.record(record.status);
        }
        counts
    }

    pub fn with_status(&self, status: TransactionStatus) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }
}
