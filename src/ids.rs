use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::ContractId;
use crate::error::HarvestError;

/// Identifiers read from a tabular export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdList {
    pub accepted: Vec<ContractId>,
    /// Data rows whose first column was not a valid identifier.
    pub rejected: usize,
}

pub struct IdSource;

impl IdSource {
    /// Reads the first column of a comma, semicolon or tab separated file,
    /// skipping the header row.
    pub fn from_path(path: &Path) -> Result<IdList, HarvestError> {
        let content = fs::read_to_string(path)
            .map_err(|_| HarvestError::IdSourceRead(path.to_path_buf()))?;
        Ok(Self::from_lines(&content))
    }

    pub fn from_lines(content: &str) -> IdList {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(detect_delimiter(content))
            .from_reader(content.as_bytes());

        let mut list = IdList::default();
        for row in reader.records() {
            let record = match row {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable identifier row");
                    list.rejected += 1;
                    continue;
                }
            };
            let cell = record.get(0).unwrap_or_default();
            if cell.is_empty() && record.iter().all(str::is_empty) {
                continue;
            }
            match cell.parse::<ContractId>() {
                Ok(id) => list.accepted.push(id),
                Err(_) => list.rejected += 1,
            }
        }
        list
    }
}

/// Picks the separator from the header row: tab, then semicolon, then comma.
fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.contains('\t') {
        b'\t'
    } else if header.contains(';') {
        b';'
    } else {
        b','
    }
}
