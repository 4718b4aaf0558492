use std::io::{self, Write};

use serde::Serialize;

use crate::controller::{ProgressEvent, ProgressSink};
use crate::ids::IdList;
use crate::report::BatchReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_ids(list: &IdList) -> io::Result<()> {
        Self::print_json(&IdSummary {
            accepted: list.accepted.len(),
            rejected: list.rejected,
        })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct IdSummary {
    accepted: usize,
    rejected: usize,
}

/// Progress goes to the log in non-interactive mode; stdout is reserved for the JSON result.
impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        tracing::debug!(message = %event.message, "progress");
    }
}
