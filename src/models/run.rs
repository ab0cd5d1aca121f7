//! Ingestion run record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion attempt for one data set.
///
/// A run is owned by the worker executing it. Every counter mutation is
/// followed by an explicit save through the catalog store; the value itself
/// is never shared between tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub data_set: String,
    pub source_type: String,
    pub status: RunStatus,
    pub total_discovered: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped_duplicate: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a new RUNNING run.
    pub fn new(data_set: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_set: data_set.into(),
            source_type: source_type.into(),
            status: RunStatus::Running,
            total_discovered: 0,
            downloaded: 0,
            failed: 0,
            skipped_duplicate: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Items that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.downloaded + self.failed + self.skipped_duplicate
    }

    /// Share of discovered items already processed, 0.0 while nothing is known.
    pub fn progress_percent(&self) -> f64 {
        if self.total_discovered == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total_discovered as f64 * 100.0
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Set the terminal status and completion time.
    ///
    /// Only the first call has an effect.
    pub fn finish(&mut self, status: RunStatus) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_running_with_zero_counters() {
        let run = Run::new("foia", "FOIA");
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.processed(), 0);
        assert!(run.completed_at.is_none());
        assert_eq!(run.progress_percent(), 0.0);
    }

    #[test]
    fn test_progress_percent() {
        let mut run = Run::new("court-records", "COURT_RECORDS");
        run.total_discovered = 8;
        run.downloaded = 3;
        run.failed = 2;
        run.skipped_duplicate = 1;
        assert_eq!(run.progress_percent(), 75.0);
    }

    #[test]
    fn test_finish_only_once() {
        let mut run = Run::new("foia", "FOIA");
        run.finish(RunStatus::Failed);
        let completed_at = run.completed_at;
        run.finish(RunStatus::Completed);

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.completed_at, completed_at);
    }

    #[test]
    fn test_status_serializes_as_screaming_case() {
        let json = serde_json::to_string(&RunStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }
}
