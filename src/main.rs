use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use xcbench::application::control::RunOutcome;
use xcbench::application::engine::BenchEngine;
use xcbench::config::{BenchConfig, FeedConfig, GatewayConfig, TimeoutPolicy};
use xcbench::interfaces::console::write_summary;
use xcbench::interfaces::csv::report_writer::ReportWriter;

#[derive(Parser)]
#[command(author, version, about = "Cross-chain transaction benchmark", long_about = None)]
struct Cli {
    /// Number of completed transactions to aim for
    #[arg(long, default_value_t = 50)]
    target: u64,

    /// Delay between two initial submissions, in milliseconds
    #[arg(long, default_value_t = 100)]
    pacing_ms: u64,

    /// Random payload width in bytes
    #[arg(long, default_value_t = 2)]
    payload_len: usize,

    /// Seed for transaction ids and payloads
    #[arg(long)]
    seed: Option<u64>,

    /// Interval between timeout checks, in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Time a transaction may stay pending before it is replaced
    #[arg(long, default_value_t = 30)]
    tx_timeout_secs: u64,

    /// Give up when the event feeds are silent this long
    #[arg(long, default_value_t = 60)]
    silence_timeout_secs: u64,

    /// Hard limit for the whole run
    #[arg(long, default_value_t = 3000)]
    overall_timeout_secs: u64,

    /// Gateway API base URL
    #[arg(long, default_value = "http://localhost:5000/api/v1")]
    gateway_url: String,

    /// Timeout for one submission call
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    #[arg(long, default_value = "default")]
    namespace: String,

    /// Event feed of the primary network
    #[arg(long, default_value = "ws://localhost:5000/ws")]
    primary_feed: String,

    /// Event feed of the peer network, subscribed on connect
    #[arg(long, default_value = "ws://localhost:5003/ws")]
    network_feed: String,

    /// Time allowed to open a feed and start its subscription
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Listener subscribed on the peer network feed
    #[arg(long, default_value = "Changed")]
    subscription: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Also write one CSV row per transaction to this file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn config(&self) -> BenchConfig {
        let connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        let mut config = BenchConfig {
            payload_len: self.payload_len,
            namespace: self.namespace.clone(),
            gateway: GatewayConfig {
                base_url: self.gateway_url.clone(),
                namespace: self.namespace.clone(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                ..GatewayConfig::default()
            },
            ..BenchConfig::default()
        }
        .with_target(self.target)
        .with_pacing(Duration::from_millis(self.pacing_ms))
        .with_timeouts(TimeoutPolicy {
            tick: Duration::from_millis(self.tick_ms),
            per_transaction: Duration::from_secs(self.tx_timeout_secs),
            silence: Duration::from_secs(self.silence_timeout_secs),
            overall: Duration::from_secs(self.overall_timeout_secs),
        })
        .with_feeds(vec![
            FeedConfig::new("primary", &self.primary_feed).with_connect_timeout(connect_timeout),
            FeedConfig::new("network", &self.network_feed)
                .with_subscription(&self.subscription)
                .with_connect_timeout(connect_timeout),
        ]);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = cli.config();
    config.validate().into_diagnostic()?;
    info!(completions = config.target, gateway = %config.gateway.invoke_url(), "Starting benchmark");

    let engine = BenchEngine::from_config(config).into_diagnostic()?;
    let control = engine.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping run");
            control.finish(RunOutcome::Interrupted);
        }
    });

    let run = engine.run().await.into_diagnostic()?;

    if let Some(path) = &cli.csv {
        let file = File::create(path).into_diagnostic()?;
        ReportWriter::new(file)
            .write_snapshot(&run.snapshot)
            .into_diagnostic()?;
        info!(path = %path.display(), rows = run.snapshot.len(), "Wrote transaction report");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &run.report).into_diagnostic()?;
        writeln!(out).into_diagnostic()?;
    } else {
        write_summary(&mut out, &run.report).into_diagnostic()?;
    }

    Ok(())
}
