//! Usage accounting for Folio.
//!
//! Every candidate attempt produces one `UsageRecord`. The recorder queues
//! records on a bounded channel and a single writer task appends them to
//! `usage-YYYY-MM-DD.log` partitions, so request handlers never wait on
//! the filesystem.

pub mod recorder;

pub use recorder::{UsageRecorder, partition_file_name};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("cannot prepare usage log directory {path}: {reason}")]
    LogDir { path: String, reason: String },
}
