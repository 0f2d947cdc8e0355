//! Usage records: one line per candidate attempt, written to an
//! append-only log that the running process never reads back.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one dispatch as seen by the usage log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Error,
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single usage log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub model: String,
    pub status: UsageStatus,
}

impl UsageRecord {
    /// A record stamped with the current time.
    pub fn now(caller: impl Into<String>, model: impl Into<String>, status: UsageStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            caller: caller.into(),
            model: model.into(),
            status,
        }
    }

    /// Calendar partition key (UTC), e.g. `2026-10-19`.
    pub fn partition(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }

    /// `<timestamp> | <caller> | <model> | <status>` with a trailing newline.
    ///
    /// Separators and line breaks inside fields are replaced so one record
    /// always stays one well-formed line.
    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {} | {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            clean_field(&self.caller),
            clean_field(&self.model),
            self.status
        )
    }
}

fn clean_field(field: &str) -> String {
    field
        .chars()
        .map(|c| if c == '|' || c.is_control() { '_' } else { c })
        .collect()
}

/// Destination for usage records.
///
/// `record` must return immediately: implementations queue the record and
/// write it elsewhere, dropping it (with a log line) if they cannot.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: UsageRecord);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn record(&self, _record: UsageRecord) {}
}
