use super::control::{RunControl, RunOutcome};
use super::correlator::{EventCorrelator, FeedActivity, InboundFrame};
use super::driver::{SentCounter, WorkloadDriver};
use super::generator::TransactionGenerator;
use super::stats::{BenchReport, RunFacts, StatsReporter};
use super::supervisor::TimeoutSupervisor;
use crate::config::BenchConfig;
use crate::domain::ports::{
    EventSourceBox, FeedConnectionBox, SharedGateway, SharedLedger,
};
use crate::domain::snapshot::LedgerSnapshot;
use crate::error::{BenchError, Result};
use crate::infrastructure::http::HttpGateway;
use crate::infrastructure::in_memory::InMemoryLedger;
use crate::infrastructure::websocket::WebSocketFeed;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

const FRAME_BUFFER: usize = 1024;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// The result of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchRun {
    pub report: BenchReport,
    /// Every record the run created, in dispatch order.
    pub snapshot: LedgerSnapshot,
}

/// One benchmark run.
///
/// `BenchEngine` owns the ledger, the gateway and the feed sources, and
/// holds no global state, so several engines can run side by side. All
/// concurrent work is spawned by [`BenchEngine::run`] and joined before it
/// returns.
pub struct BenchEngine {
    config: BenchConfig,
    ledger: SharedLedger,
    gateway: SharedGateway,
    feeds: Vec<EventSourceBox>,
    control: RunControl,
    sent: SentCounter,
}

impl BenchEngine {
    /// Creates an engine from explicit adapters.
    ///
    /// # Arguments
    ///
    /// * `config` - Run parameters. Validated when the run starts.
    /// * `ledger` - Store for the run's transaction records.
    /// * `gateway` - Where transactions are submitted.
    /// * `feeds` - Event feeds to correlate. All are opened before the first dispatch.
    pub fn new(
        config: BenchConfig,
        ledger: SharedLedger,
        gateway: SharedGateway,
        feeds: Vec<EventSourceBox>,
    ) -> Self {
        Self {
            config,
            ledger,
            gateway,
            feeds,
            control: RunControl::new(),
            sent: SentCounter::new(),
        }
    }

    /// Creates an engine talking HTTP and websockets as described by `config`.
    pub fn from_config(config: BenchConfig) -> Result<Self> {
        let gateway = HttpGateway::new(config.gateway.clone())?;
        let feeds = config
            .feeds
            .iter()
            .map(|feed| {
                Box::new(WebSocketFeed::new(feed, &config.namespace, config.autoack)) as EventSourceBox
            })
            .collect();
        Ok(Self::new(
            config,
            Arc::new(InMemoryLedger::new()),
            Arc::new(gateway),
            feeds,
        ))
    }

    /// Handle for stopping the run from outside, e.g. on Ctrl-C.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    /// Live sent counter. [`SentCounter::observe`] reads it consistently
    /// with the ledger while the run is in progress.
    pub fn sent(&self) -> SentCounter {
        self.sent.clone()
    }

    /// Runs the benchmark until the target is reached or a timeout policy
    /// ends it.
    ///
    /// Fails only on setup errors (invalid config, unreachable feed) or when
    /// a task hits a fatal error such as a duplicate correlation key.
    pub async fn run(self) -> Result<BenchRun> {
        self.config.validate()?;
        let control = self.control;
        let config = self.config;

        let mut connections = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            let connection = feed.connect().await?;
            info!(feed = feed.name(), "Connected to event feed");
            connections.push((feed.name().to_string(), connection));
        }

        let started = Instant::now();
        let activity = Arc::new(FeedActivity::new(started));
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
        let (replace_tx, replace_rx) = mpsc::unbounded_channel();

        let listeners: Vec<JoinHandle<()>> = connections
            .into_iter()
            .map(|(name, connection)| {
                tokio::spawn(listen(name, connection, frames_tx.clone(), control.clone()))
            })
            .collect();
        drop(frames_tx);

        let correlator = EventCorrelator::new(
            self.ledger.clone(),
            activity.clone(),
            config.frame_kind.clone(),
            config.event_name.clone(),
            config.target,
        );
        let correlator = spawn_task(&control, correlator.run(frames_rx, control.clone()));

        let supervisor = TimeoutSupervisor::new(
            self.ledger.clone(),
            activity,
            config.timeouts,
            config.target,
            started,
            replace_tx,
        );
        let supervisor = spawn_task(&control, supervisor.run(control.clone()));

        let driver = WorkloadDriver::new(
            self.ledger.clone(),
            self.gateway.clone(),
            TransactionGenerator::new(config.payload_len, config.seed),
            config.pacing,
        )
        .with_counter(self.sent.clone());
        let driver = spawn_task(&control, driver.run(config.target, replace_rx, control.clone()));

        control.finished().await;
        let wall_clock = started.elapsed();
        let outcome = control.outcome().unwrap_or(RunOutcome::Interrupted);
        info!(%outcome, wall_clock_ms = wall_clock.as_millis() as u64, "Run finished");

        let total_sent = join(driver).await?;
        let feed = join(correlator).await?;
        let supervisor = join(supervisor).await?;
        for listener in listeners {
            listener.await.map_err(|e| BenchError::Task(e.to_string()))?;
        }

        let snapshot = self.ledger.snapshot().await?;
        let report = StatsReporter::report(
            &snapshot,
            RunFacts {
                target: config.target,
                total_sent,
                wall_clock,
                outcome,
                feed,
                supervisor,
            },
        );
        Ok(BenchRun { report, snapshot })
    }
}

/// Spawns `task`, cancelling the run if it fails or panics so the others
/// stop too. A panic comes back as [`BenchError::Task`].
fn spawn_task<T, F>(control: &RunControl, task: F) -> JoinHandle<Result<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let token = control.token();
    tokio::spawn(async move {
        let result = AssertUnwindSafe(task)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(BenchError::Task(panic_message(panic.as_ref()))));
        if let Err(e) = &result {
            warn!(error = %e, "Task failed, stopping run");
            token.cancel();
        }
        result
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("task panicked: {detail}")
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.await.map_err(|e| BenchError::Task(e.to_string()))?
}

/// Forwards frames from one feed connection until the run finishes or the
/// feed closes.
async fn listen(
    name: String,
    mut connection: FeedConnectionBox,
    frames: mpsc::Sender<InboundFrame>,
    control: RunControl,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = control.finished() => break,
            next = connection.next_frame() => next,
        };
        match next {
            Ok(Some(text)) => {
                let frame = InboundFrame {
                    feed: name.clone(),
                    text,
                };
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!(feed = %name, "Event feed closed by peer");
                break;
            }
            Err(e) => {
                warn!(feed = %name, error = %e, "Event feed failed");
                break;
            }
        }
    }

    match timeout(CLOSE_GRACE, connection.close()).await {
        Ok(Ok(())) => debug!(feed = %name, "Event feed closed"),
        Ok(Err(e)) => debug!(feed = %name, error = %e, "Error closing event feed"),
        Err(_) => debug!(feed = %name, "Event feed did not close in time"),
    }
}
