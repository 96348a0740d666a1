//! Application layer: the tasks that make up a benchmark run.
//!
//! [`engine::BenchEngine`] wires the workload driver, the event correlator
//! and the timeout supervisor around one shared ledger. The tasks talk over
//! `tokio` channels and stop together through [`control::RunControl`].

pub mod control;
pub mod correlator;
pub mod driver;
pub mod engine;
pub mod generator;
pub mod stats;
pub mod supervisor;
