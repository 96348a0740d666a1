use super::control::{RunControl, RunOutcome};
use super::correlator::FeedActivity;
use super::driver::ReplacementRequest;
use crate::config::TimeoutPolicy;
use crate::domain::ports::SharedLedger;
use crate::domain::transaction::Transition;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    /// Records timed out individually by the per-transaction deadline.
    pub stalled: u64,
    /// Replacement requests handed to the driver.
    pub replacements: u64,
    /// Records timed out in bulk when the run was aborted.
    pub expired: u64,
}

/// Enforces the per-transaction, silence and overall timeouts.
pub struct TimeoutSupervisor {
    ledger: SharedLedger,
    activity: Arc<FeedActivity>,
    policy: TimeoutPolicy,
    target: u64,
    started: Instant,
    replacements: mpsc::UnboundedSender<ReplacementRequest>,
    stats: SupervisorStats,
}

impl TimeoutSupervisor {
    pub fn new(
        ledger: SharedLedger,
        activity: Arc<FeedActivity>,
        policy: TimeoutPolicy,
        target: u64,
        started: Instant,
        replacements: mpsc::UnboundedSender<ReplacementRequest>,
    ) -> Self {
        Self {
            ledger,
            activity,
            policy,
            target,
            started,
            replacements,
            stats: SupervisorStats::default(),
        }
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    pub async fn run(mut self, control: RunControl) -> Result<SupervisorStats> {
        let mut ticker = interval(self.policy.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = control.finished() => break,
                _ = ticker.tick() => {
                    if let Some(outcome) = self.tick(Instant::now()).await? {
                        control.finish(outcome);
                        break;
                    }
                }
            }
        }
        Ok(self.stats)
    }

    /// Evaluates every policy once. Returns the outcome if the run must end.
    pub async fn tick(&mut self, now: Instant) -> Result<Option<RunOutcome>> {
        let counts = self.ledger.counts().await?;
        if counts.completed >= self.target {
            return Ok(Some(RunOutcome::TargetReached));
        }

        let running_for = now.saturating_duration_since(self.started);
        if running_for >= self.policy.overall {
            let expired = self.expire_pending(now).await?;
            warn!(
                running_secs = running_for.as_secs(),
                expired, "Overall timeout reached"
            );
            return Ok(Some(RunOutcome::OverallTimeout));
        }

        let quiet_for = self.activity.quiet_for(now);
        if counts.pending > 0 && quiet_for >= self.policy.silence {
            let expired = self.expire_pending(now).await?;
            warn!(
                quiet_secs = quiet_for.as_secs(),
                frames = self.activity.frames(),
                expired,
                "Event feed silent, giving up on pending transactions"
            );
            return Ok(Some(RunOutcome::SilenceTimeout));
        }

        for (key, age) in self.ledger.pending(now).await? {
            if age <= self.policy.per_transaction {
                continue;
            }
            if !self.ledger.try_transition(&key, Transition::TimeOut, now).await? {
                // Completed between the scan and the transition.
                continue;
            }
            self.stats.stalled += 1;
            info!(key = %key, age_ms = age.as_millis() as u64, "Transaction stalled, requesting replacement");

            if self.replacements.send(ReplacementRequest { replaces: key }).is_ok() {
                self.stats.replacements += 1;
            } else {
                debug!("Driver stopped, replacement dropped");
            }
        }

        Ok(None)
    }

    async fn expire_pending(&mut self, now: Instant) -> Result<u64> {
        let mut expired = 0;
        for (key, _) in self.ledger.pending(now).await? {
            if self.ledger.try_transition(&key, Transition::TimeOut, now).await? {
                expired += 1;
            }
        }
        self.stats.expired += expired;
        Ok(expired)
    }
}
