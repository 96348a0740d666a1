use super::control::RunOutcome;
use super::correlator::CorrelatorStats;
use super::supervisor::SupervisorStats;
use crate::domain::snapshot::{LedgerSnapshot, StatusCounts};
use crate::domain::transaction::TransactionStatus;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Latency of completed transactions, dispatch to matched event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    #[serde(rename = "average_ms", serialize_with = "serialize_millis")]
    pub average: Duration,
    #[serde(rename = "min_ms", serialize_with = "serialize_millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", serialize_with = "serialize_millis")]
    pub max: Duration,
    #[serde(rename = "p50_ms", serialize_with = "serialize_millis")]
    pub p50: Duration,
    #[serde(rename = "p95_ms", serialize_with = "serialize_millis")]
    pub p95: Duration,
    #[serde(rename = "p99_ms", serialize_with = "serialize_millis")]
    pub p99: Duration,
}

fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// Facts about the run that the ledger does not hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunFacts {
    pub target: u64,
    pub total_sent: u64,
    pub wall_clock: Duration,
    pub outcome: RunOutcome,
    pub feed: CorrelatorStats,
    pub supervisor: SupervisorStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub outcome: RunOutcome,
    pub target: u64,
    pub target_reached: bool,
    pub total_sent: u64,
    pub counts: StatusCounts,
    #[serde(rename = "wall_clock_ms", serialize_with = "serialize_millis")]
    pub wall_clock: Duration,
    pub latency: Option<LatencySummary>,
    /// Completed transactions per second of wall clock.
    pub throughput: f64,
    /// Share of sent transactions that did not complete.
    pub loss_rate: f64,
    pub feed: CorrelatorStats,
    pub supervisor: SupervisorStats,
}

/// Turns a final ledger snapshot into a [`BenchReport`].
pub struct StatsReporter;

impl StatsReporter {
    /// Builds the report from the snapshot taken after every task stopped.
    /// Counts and latencies come from the snapshot; `facts` supplies what
    /// only the running tasks knew.
    pub fn report(snapshot: &LedgerSnapshot, facts: RunFacts) -> BenchReport {
        let counts = snapshot.counts();

        let mut latencies: Vec<Duration> = snapshot
            .with_status(TransactionStatus::Completed)
            .filter_map(|r| r.elapsed)
            .collect();
        latencies.sort_unstable();

        let wall_secs = facts.wall_clock.as_secs_f64();
        let throughput = if wall_secs > 0.0 {
            counts.completed as f64 / wall_secs
        } else {
            0.0
        };
        let loss_rate = if facts.total_sent > 0 {
            facts.total_sent.saturating_sub(counts.completed) as f64 / facts.total_sent as f64
        } else {
            0.0
        };

        BenchReport {
            outcome: facts.outcome,
            target: facts.target,
            target_reached: counts.completed >= facts.target,
            total_sent: facts.total_sent,
            counts,
            wall_clock: facts.wall_clock,
            latency: summarize(&latencies),
            throughput,
            loss_rate,
            feed: facts.feed,
            supervisor: facts.supervisor,
        }
    }
}

fn summarize(sorted: &[Duration]) -> Option<LatencySummary> {
    let (min, max) = (*sorted.first()?, *sorted.last()?);
    Some(LatencySummary {
        average: mean(sorted),
        min,
        max,
        p50: nearest_rank(sorted, 50),
        p95: nearest_rank(sorted, 95),
        p99: nearest_rank(sorted, 99),
    })
}

fn mean(values: &[Duration]) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let total: u128 = values.iter().map(Duration::as_nanos).sum();
    let nanos = total / values.len().max(1) as u128;
    // The mean never exceeds the largest value, so the seconds fit in u64
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

fn nearest_rank(sorted: &[Duration], percentile: usize) -> Duration {
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{CorrelationKey, TransactionRecord, Transition};
    use serde_json::json;
    use tokio::time::Instant;

    fn facts(total_sent: u64, wall_clock: Duration) -> RunFacts {
        RunFacts {
            target: 3,
            total_sent,
            wall_clock,
            outcome: RunOutcome::SilenceTimeout,
            feed: CorrelatorStats::default(),
            supervisor: SupervisorStats::default(),
        }
    }

    fn snapshot(outcomes: &[(Option<Transition>, u64)]) -> LedgerSnapshot {
        let start = Instant::now();
        let records = outcomes
            .iter()
            .enumerate()
            .map(|(i, (transition, millis))| {
                let label = format!("tx-{i}");
                let mut record =
                    TransactionRecord::pending(CorrelationKey::new(label.as_bytes(), vec![0]), label, start);
                if let Some(transition) = transition {
                    record.apply(transition.clone(), start + Duration::from_millis(*millis));
                }
                record
            })
            .collect();
        LedgerSnapshot::new(records)
    }

    fn complete() -> Option<Transition> {
        Some(Transition::Complete { event: json!({}) })
    }

    #[test]
    fn test_report_partitions_and_rates() {
        let snapshot = snapshot(&[
            (complete(), 100),
            (complete(), 300),
            (Some(Transition::Fail { reason: "x".into() }), 0),
            (Some(Transition::TimeOut), 5000),
            (None, 0),
        ]);

        let report = StatsReporter::report(&snapshot, facts(5, Duration::from_secs(2)));

        assert_eq!(
            report.counts,
            StatusCounts {
                pending: 1,
                completed: 2,
                failed: 1,
                timed_out: 1
            }
        );
        assert_eq!(report.counts.total(), report.total_sent);
        assert!(!report.target_reached);
        assert_eq!(report.throughput, 1.0);
        assert!((report.loss_rate - 0.6).abs() < 1e-9);

        let latency = report.latency.unwrap();
        assert_eq!(latency.min, Duration::from_millis(100));
        assert_eq!(latency.max, Duration::from_millis(300));
        assert_eq!(latency.average, Duration::from_millis(200));
    }

    #[test]
    fn test_empty_run() {
        let report = StatsReporter::report(&LedgerSnapshot::default(), facts(0, Duration::ZERO));
        assert!(report.latency.is_none());
        assert_eq!(report.throughput, 0.0);
        assert_eq!(report.loss_rate, 0.0);
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let sorted: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(nearest_rank(&sorted, 50), Duration::from_millis(50));
        assert_eq!(nearest_rank(&sorted, 95), Duration::from_millis(95));
        assert_eq!(nearest_rank(&sorted, 99), Duration::from_millis(99));

        let single = [Duration::from_millis(7)];
        assert_eq!(nearest_rank(&single, 99), Duration::from_millis(7));
    }

    #[test]
    fn test_average_is_exact_and_never_overflows() {
        let sorted = [Duration::from_millis(1), Duration::from_millis(2)];
        assert_eq!(summarize(&sorted).unwrap().average, Duration::from_micros(1500));

        let huge = [Duration::from_secs(u64::MAX - 1), Duration::MAX];
        let summary = summarize(&huge).unwrap();
        assert_eq!(summary.average.as_secs(), u64::MAX - 1);
        assert_eq!(summary.max, Duration::MAX);
    }

    #[test]
    fn test_report_serializes_millis() {
        let snapshot = snapshot(&[(complete(), 1500)]);
        let report = StatsReporter::report(&snapshot, facts(1, Duration::from_secs(3)));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "silence_timeout");
        assert_eq!(value["wall_clock_ms"], 3000.0);
        assert_eq!(value["latency"]["average_ms"], 1500.0);
        assert_eq!(value["counts"]["completed"], 1);
    }
}
