//! Output adapters for a finished run.

pub mod console;
pub mod csv;
