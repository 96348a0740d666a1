use super::control::{RunControl, RunOutcome};
use crate::domain::event::FeedFrame;
use crate::domain::ports::SharedLedger;
use crate::domain::transaction::{CorrelationKey, Transition};
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// When the event feed last produced a frame.
///
/// Written by the correlator, read by the supervisor's silence policy.
#[derive(Debug)]
pub struct FeedActivity {
    started: Instant,
    // Microseconds since `started`, plus one. Zero means no frame yet.
    last_frame: AtomicU64,
    frames: AtomicU64,
}

impl FeedActivity {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            last_frame: AtomicU64::new(0),
            frames: AtomicU64::new(0),
        }
    }

    pub fn record(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.started).as_micros() as u64 + 1;
        self.last_frame.fetch_max(offset, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_frame(&self) -> Option<Instant> {
        match self.last_frame.load(Ordering::Relaxed) {
            0 => None,
            offset => Some(self.started + Duration::from_micros(offset - 1)),
        }
    }

    /// Time since the last frame, or since the run started if none arrived.
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame().unwrap_or(self.started))
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

/// A raw frame read by one feed listener.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub feed: String,
    pub text: String,
}

/// What the correlator did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Completed the pending record with this key.
    Matched(CorrelationKey),
    /// A qualifying change with no pending record to complete.
    Unmatched,
    /// Valid JSON of another kind or event name.
    Ignored,
    /// Not JSON, or a change whose key/value is not hex.
    Malformed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorrelatorStats {
    pub frames: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub ignored: u64,
    pub malformed: u64,
}

/// Matches ledger-change events to pending transactions.
pub struct EventCorrelator {
    ledger: SharedLedger,
    activity: Arc<FeedActivity>,
    frame_kind: String,
    event_name: String,
    target: u64,
    stats: CorrelatorStats,
}

impl EventCorrelator {
    pub fn new(
        ledger: SharedLedger,
        activity: Arc<FeedActivity>,
        frame_kind: impl Into<String>,
        event_name: impl Into<String>,
        target: u64,
    ) -> Self {
        Self {
            ledger,
            activity,
            frame_kind: frame_kind.into(),
            event_name: event_name.into(),
            target,
            stats: CorrelatorStats::default(),
        }
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    /// Consumes frames until the run finishes or every listener is gone.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<InboundFrame>,
        control: RunControl,
    ) -> Result<CorrelatorStats> {
        loop {
            tokio::select! {
                biased;
                _ = control.finished() => break,
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("All event feeds closed");
                        break;
                    };
                    if let FrameOutcome::Matched(_) = self.handle_frame(&frame.feed, &frame.text, Instant::now()).await?
                        && self.stats.matched >= self.target
                    {
                        info!(completed = self.stats.matched, "Completion target reached");
                        control.finish(RunOutcome::TargetReached);
                    }
                }
            }
        }
        Ok(self.stats)
    }

    /// Classifies one frame and, for a matching confirmation, completes the
    /// pending record it names. Every frame refreshes feed activity, whatever
    /// its outcome. Only ledger errors are returned.
    pub async fn handle_frame(&mut self, feed: &str, text: &str, now: Instant) -> Result<FrameOutcome> {
        self.activity.record(now);
        self.stats.frames += 1;

        let outcome = self.classify(feed, text, now).await?;
        match &outcome {
            FrameOutcome::Matched(_) => self.stats.matched += 1,
            FrameOutcome::Unmatched => self.stats.unmatched += 1,
            FrameOutcome::Ignored => self.stats.ignored += 1,
            FrameOutcome::Malformed => self.stats.malformed += 1,
        }
        Ok(outcome)
    }

    async fn classify(&self, feed: &str, text: &str, now: Instant) -> Result<FrameOutcome> {
        let frame = match FeedFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(feed, error = %e, "Received non-JSON frame");
                return Ok(FrameOutcome::Malformed);
            }
        };

        let Some(change) = frame.ledger_change(&self.frame_kind, &self.event_name) else {
            debug!(feed, kind = ?frame.kind, "Ignoring frame");
            return Ok(FrameOutcome::Ignored);
        };

        let Some(key) = CorrelationKey::from_hex(&change.output.key, &change.output.value) else {
            warn!(
                feed,
                key = %change.output.key,
                value = %change.output.value,
                "Event output is not hex"
            );
            return Ok(FrameOutcome::Malformed);
        };

        let event = frame.event.unwrap_or_default();
        if self
            .ledger
            .try_transition(&key, Transition::Complete { event }, now)
            .await?
        {
            if let Some(record) = self.ledger.get(&key).await? {
                info!(
                    feed,
                    tx_id = %record.label,
                    elapsed_ms = record.elapsed.unwrap_or_default().as_millis() as u64,
                    "Transaction completed"
                );
            }
            Ok(FrameOutcome::Matched(key))
        } else {
            debug!(feed, key = %key, "No pending transaction for event");
            Ok(FrameOutcome::Unmatched)
        }
    }
}
