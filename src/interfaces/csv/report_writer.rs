use crate::domain::snapshot::LedgerSnapshot;
use crate::domain::transaction::{TransactionRecord, TransactionStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    tx_id: &'a str,
    key: String,
    payload: String,
    status: TransactionStatus,
    /// Empty while the record is still pending.
    elapsed_ms: Option<u128>,
}

impl<'a> From<&'a TransactionRecord> for ReportRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            tx_id: &record.label,
            key: record.key.id_hex(),
            payload: record.key.payload_hex(),
            status: record.status,
            elapsed_ms: record.elapsed.map(|e| e.as_millis()),
        }
    }
}

/// Writes one CSV row per transaction, in dispatch order.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(sink),
        }
    }

    pub fn write_snapshot(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        if snapshot.is_empty() {
            self.writer
                .write_record(["tx_id", "key", "payload", "status", "elapsed_ms"])?;
        }
        for record in snapshot.records() {
            self.writer.serialize(ReportRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
