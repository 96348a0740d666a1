use crate::application::stats::BenchReport;
use std::io::{self, Write};
use std::time::Duration;

fn millis(value: Duration) -> f64 {
    value.as_secs_f64() * 1000.0
}

/// Renders the human-readable run summary.
pub fn write_summary<W: Write>(out: &mut W, report: &BenchReport) -> io::Result<()> {
    let counts = &report.counts;
    writeln!(out, "Run finished: {}", report.outcome)?;
    writeln!(
        out,
        "  target        {} ({})",
        report.target,
        if report.target_reached { "reached" } else { "not reached" }
    )?;
    writeln!(out, "  sent          {}", report.total_sent)?;
    writeln!(out, "  completed     {}", counts.completed)?;
    writeln!(out, "  failed        {}", counts.failed)?;
    writeln!(out, "  timed out     {}", counts.timed_out)?;
    writeln!(out, "  pending       {}", counts.pending)?;
    writeln!(out, "  wall clock    {:.3} s", report.wall_clock.as_secs_f64())?;
    writeln!(out, "  throughput    {:.2} tx/s", report.throughput)?;
    writeln!(out, "  loss rate     {:.2} %", report.loss_rate * 100.0)?;

    match &report.latency {
        Some(l) => writeln!(
            out,
            "  latency (ms)  avg {:.1}  min {:.1}  max {:.1}  p50 {:.1}  p95 {:.1}  p99 {:.1}",
            millis(l.average),
            millis(l.min),
            millis(l.max),
            millis(l.p50),
            millis(l.p95),
            millis(l.p99)
        )?,
        None => writeln!(out, "  latency (ms)  n/a")?,
    }

    let feed = &report.feed;
    writeln!(
        out,
        "  frames        {} (matched {}, unmatched {}, ignored {}, malformed {})",
        feed.frames, feed.matched, feed.unmatched, feed.ignored, feed.malformed
    )?;
    writeln!(
        out,
        "  stalled       {} ({} replaced)",
        report.supervisor.stalled, report.supervisor.replacements
    )?;
    Ok(())
}
