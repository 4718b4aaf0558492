use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::ContractId;
use crate::error::HarvestError;
use crate::sink::write_json_atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    last_processed: ContractId,
}

/// Remembers the last identifier the first pass finished with, so an
/// interrupted run can pick up after it.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: Utf8PathBuf,
}

impl Checkpoint {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Last recorded identifier. A missing or unreadable file means start from the top.
    pub fn load(&self) -> Option<ContractId> {
        let content = fs::read_to_string(self.path.as_std_path()).ok()?;
        match serde_json::from_str::<CheckpointFile>(&content) {
            Ok(file) => Some(file.last_processed),
            Err(err) => {
                tracing::warn!(path = %self.path, error = %err, "ignoring unreadable checkpoint");
                None
            }
        }
    }

    pub fn save(&self, id: &ContractId) -> Result<(), HarvestError> {
        write_json_atomic(
            &self.path,
            &CheckpointFile {
                last_processed: id.clone(),
            },
        )
    }
}

/// Identifiers that come after `last` in `ids`. All of them when `last` is absent
/// or not in the list.
pub fn resume_after<'a>(ids: &'a [ContractId], last: Option<&ContractId>) -> &'a [ContractId] {
    let Some(last) = last else {
        return ids;
    };
    match ids.iter().position(|id| id == last) {
        Some(index) => &ids[index + 1..],
        None => ids,
    }
}
