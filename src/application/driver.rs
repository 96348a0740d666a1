use super::control::RunControl;
use super::generator::TransactionGenerator;
use crate::domain::ports::{Ledger, SharedGateway, SharedLedger};
use crate::domain::snapshot::StatusCounts;
use crate::domain::transaction::{CorrelationKey, TransactionRecord, Transition};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Asks the driver for a fresh transaction in place of one that stalled.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementRequest {
    pub replaces: CorrelationKey,
}

/// Number of transactions sent so far.
///
/// A dispatch inserts its record and bumps the count under one write guard.
/// [`SentCounter::observe`] reads both under the read side, so an observer
/// always sees `sent == ledger total` while the run is live.
#[derive(Debug, Clone)]
pub struct SentCounter {
    gate: Arc<RwLock<()>>,
    sent: Arc<watch::Sender<u64>>,
}

impl Default for SentCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentCounter {
    pub fn new() -> Self {
        let (sent, _) = watch::channel(0);
        Self {
            gate: Arc::new(RwLock::new(())),
            sent: Arc::new(sent),
        }
    }

    pub fn get(&self) -> u64 {
        *self.sent.borrow()
    }

    /// Change notifications. The value may run ahead of a separate ledger
    /// read; use [`SentCounter::observe`] to compare the two.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sent.subscribe()
    }

    /// Reads the counter together with the ledger's status counts.
    pub async fn observe(&self, ledger: &dyn Ledger) -> Result<(u64, StatusCounts)> {
        let _gate = self.gate.read().await;
        let counts = ledger.counts().await?;
        Ok((self.get(), counts))
    }

    async fn record(&self, ledger: &dyn Ledger, record: TransactionRecord) -> Result<()> {
        let _gate = self.gate.write().await;
        ledger.insert(record).await?;
        self.sent.send_modify(|sent| *sent += 1);
        Ok(())
    }
}

/// Issues transactions against the gateway and records them in the ledger.
///
/// The driver is the only writer of the sent counter. Replacements requested
/// by the supervisor are dispatched here too.
pub struct WorkloadDriver {
    ledger: SharedLedger,
    gateway: SharedGateway,
    generator: TransactionGenerator,
    pacing: Duration,
    sent: SentCounter,
}

impl WorkloadDriver {
    pub fn new(
        ledger: SharedLedger,
        gateway: SharedGateway,
        generator: TransactionGenerator,
        pacing: Duration,
    ) -> Self {
        Self {
            ledger,
            gateway,
            generator,
            pacing,
            sent: SentCounter::new(),
        }
    }

    /// Counts into `sent` instead of a private counter.
    pub fn with_counter(mut self, sent: SentCounter) -> Self {
        self.sent = sent;
        self
    }

    pub fn counter(&self) -> SentCounter {
        self.sent.clone()
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.get()
    }

    /// Dispatches `initial` paced transactions, then serves replacement
    /// requests until the run finishes. Returns the final sent count.
    pub async fn run(
        mut self,
        initial: u64,
        mut replacements: mpsc::UnboundedReceiver<ReplacementRequest>,
        control: RunControl,
    ) -> Result<u64> {
        let mut remaining = initial;
        let mut replacements_open = true;
        let mut pacer = interval(self.pacing);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(initial, pacing_ms = self.pacing.as_millis() as u64, "Starting workload");

        loop {
            tokio::select! {
                biased;
                _ = control.finished() => break,
                request = replacements.recv(), if replacements_open => match request {
                    Some(request) => {
                        debug!(replaces = %request.replaces, "Dispatching replacement");
                        self.dispatch(&control).await?;
                    }
                    None => replacements_open = false,
                },
                _ = pacer.tick(), if remaining > 0 => {
                    self.dispatch(&control).await?;
                    remaining -= 1;
                    if remaining == 0 {
                        info!(total_sent = self.total_sent(), "Initial workload dispatched");
                    }
                }
            }
        }

        let total_sent = self.total_sent();
        debug!(total_sent, "Workload driver stopped");
        Ok(total_sent)
    }

    /// Records and submits one new transaction.
    ///
    /// A failed submission moves the record straight to `Failed`. If the run
    /// finishes while the call is in flight, the record stays `Pending`.
    pub async fn dispatch(&mut self, control: &RunControl) -> Result<CorrelationKey> {
        let submission = self.generator.next_submission();
        let key = submission.key.clone();

        let record = TransactionRecord::pending(key.clone(), submission.label.clone(), Instant::now());
        self.sent.record(self.ledger.as_ref(), record).await?;

        let result = tokio::select! {
            result = self.gateway.submit(&submission) => result,
            _ = control.finished() => {
                debug!(tx_id = %submission.label, "Run finished during submission");
                return Ok(key);
            }
        };

        match result {
            Ok(ack) => {
                debug!(
                    tx_id = %submission.label,
                    args = %submission.key.payload_hex(),
                    status = ack.status,
                    "Submission accepted"
                );
            }
            Err(e) => {
                warn!(tx_id = %submission.label, error = %e, "Submission failed");
                self.ledger
                    .try_transition(
                        &key,
                        Transition::Fail {
                            reason: e.to_string(),
                        },
                        Instant::now(),
                    )
                    .await?;
            }
        }
        Ok(key)
    }
}
