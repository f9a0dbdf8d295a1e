//! Scheduler layer for the runner
//!
//! Coordinates the workload, the uploader and the shutdown signal from the
//! moment the workload is running until everything is torn down.

pub mod supervisor;

pub use supervisor::{RunSummary, Timeouts, supervise};
