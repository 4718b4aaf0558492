use std::fmt::Write as _;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::domain::ErrorInfo;

/// Why a run stopped before working through every identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    CeilingExceeded,
    Cancelled,
}

impl AbortReason {
    pub fn label(self) -> &'static str {
        match self {
            AbortReason::CeilingExceeded => "attempt ceiling reached",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

/// Running totals, shared with progress listeners after every attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub attempts: u64,
    pub retried: u64,
    /// Identifiers waiting for the retry pass.
    pub queued: usize,
}

impl BatchCounters {
    pub fn processed(&self) -> usize {
        self.success + self.failure + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub attempts: u64,
    pub retried: u64,
    pub still_failing: Vec<ErrorInfo>,
    pub aborted: Option<AbortReason>,
    pub failure_log: Option<Utf8PathBuf>,
    pub archive: Option<Utf8PathBuf>,
    pub archive_error: Option<String>,
    /// Writes that failed after the attempts themselves were done (final batch, failure log).
    pub persistence_errors: Vec<String>,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self::from_counters(BatchCounters::default())
    }

    pub(crate) fn from_counters(counters: BatchCounters) -> Self {
        Self {
            total: counters.total,
            success: counters.success,
            failure: counters.failure,
            skipped: counters.skipped,
            attempts: counters.attempts,
            retried: counters.retried,
            still_failing: Vec::new(),
            aborted: None,
            failure_log: None,
            archive: None,
            archive_error: None,
            persistence_errors: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.success + self.failure + self.skipped
    }

    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.processed() == self.total
    }

    /// Plain-text summary block printed at the end of every run.
    pub fn dashboard(&self) -> String {
        let mut out = String::new();
        let status = match self.aborted {
            Some(reason) => format!("aborted ({})", reason.label()),
            None => "complete".to_string(),
        };
        let _ = writeln!(out, "==== contract harvest ====");
        let _ = writeln!(out, "status      {status}");
        let _ = writeln!(out, "total       {}", self.total);
        let _ = writeln!(out, "processed   {}", self.processed());
        let _ = writeln!(out, "success     {}", self.success);
        let _ = writeln!(out, "failure     {}", self.failure);
        let _ = writeln!(out, "skipped     {}", self.skipped);
        let _ = writeln!(out, "attempts    {} ({} retries)", self.attempts, self.retried);
        let _ = writeln!(out, "retry queue {}", self.still_failing.len());
        if let Some(path) = &self.failure_log {
            let _ = writeln!(out, "failure log {path}");
        }
        match (&self.archive, &self.archive_error) {
            (Some(path), _) => {
                let _ = writeln!(out, "archive     {path}");
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "archive     failed: {err}");
            }
            (None, None) => {}
        }
        for err in &self.persistence_errors {
            let _ = writeln!(out, "write error {err}");
        }
        out
    }
}
