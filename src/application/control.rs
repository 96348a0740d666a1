use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    TargetReached,
    SilenceTimeout,
    OverallTimeout,
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunOutcome::TargetReached => "target reached",
            RunOutcome::SilenceTimeout => "event feed silent",
            RunOutcome::OverallTimeout => "overall timeout",
            RunOutcome::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Shared stop signal for every task of one run.
///
/// The first caller of [`RunControl::finish`] decides the outcome; later
/// calls only cancel.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    token: CancellationToken,
    outcome: Arc<OnceLock<RunOutcome>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `outcome` if none is set yet and cancels the run.
    ///
    /// Returns whether this call set the outcome.
    pub fn finish(&self, outcome: RunOutcome) -> bool {
        let first = self.outcome.set(outcome).is_ok();
        self.token.cancel();
        first
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.get().copied()
    }

    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn finished(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_outcome_wins() {
        let control = RunControl::new();
        assert!(control.outcome().is_none());

        assert!(control.finish(RunOutcome::TargetReached));
        assert!(!control.finish(RunOutcome::OverallTimeout));

        assert!(control.is_finished());
        assert_eq!(control.outcome(), Some(RunOutcome::TargetReached));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let control = RunControl::new();
        let other = control.clone();

        let waiter = tokio::spawn(async move {
            other.finished().await;
            other.outcome()
        });
        control.finish(RunOutcome::SilenceTimeout);

        assert_eq!(waiter.await.unwrap(), Some(RunOutcome::SilenceTimeout));
    }
}
