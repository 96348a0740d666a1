mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::MockGateway;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}

#[test]
fn test_help_lists_run_parameters() {
    let mut cmd = Command::new(cargo_bin!("xcbench"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--csv"));
}

#[test]
fn test_zero_target_is_rejected() {
    let mut cmd = Command::new(cargo_bin!("xcbench"));
    cmd.args(["--target", "0"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("target must be at least 1"));
}

#[test]
fn test_zero_pacing_is_rejected() {
    let mut cmd = Command::new(cargo_bin!("xcbench"));
    cmd.args(["--pacing-ms", "0"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("pacing must be non-zero"));
}

#[test]
fn test_unreachable_feed_fails_before_submitting() {
    let url = closed_port_url();
    let mut cmd = Command::new(cargo_bin!("xcbench"));
    cmd.args(["--target", "1", "--primary-feed", url.as_str(), "--network-feed", url.as_str()]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("event feed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_run_against_mock_gateway() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = MockGateway::start().await;
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("transactions.csv");
    let base_url = gateway.base_url();
    let feed_url = gateway.feed_url();

    let mut cmd = Command::new(cargo_bin!("xcbench"));
    cmd.args([
        "--target",
        "3",
        "--pacing-ms",
        "10",
        "--tick-ms",
        "50",
        "--silence-timeout-secs",
        "10",
        "--overall-timeout-secs",
        "30",
        "--seed",
        "9",
        "--json",
        "--gateway-url",
        base_url.as_str(),
        "--primary-feed",
        feed_url.as_str(),
        "--network-feed",
        feed_url.as_str(),
        "--csv",
    ])
    .arg(&csv_path);

    let output = tokio::task::spawn_blocking(move || cmd.output()).await??;
    output.clone().assert().success();

    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["outcome"], "target_reached");
    assert_eq!(report["target_reached"], true);
    assert_eq!(report["counts"]["completed"], 3);
    assert_eq!(report["total_sent"], 3);
    // Both feeds see every event; the second copy finds nothing pending
    assert_eq!(report["feed"]["matched"], 3);

    let mut reader = csv::Reader::from_path(&csv_path)?;
    let headers = reader.headers()?.clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        ["tx_id", "key", "payload", "status", "elapsed_ms"]
    );
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(row[0].starts_with("tx-"));
        assert_eq!(&row[3], "completed");
        assert!(!row[4].is_empty());
    }

    Ok(())
}
