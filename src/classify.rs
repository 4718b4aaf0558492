use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{Artifact, ArtifactPayload, ContractId, ErrorInfo, FailureStatus, Outcome};
use crate::error::HarvestError;

/// What a backend hands back before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Bytes captured from a download, with the `content-disposition` value that accompanied them.
    Document {
        bytes: Vec<u8>,
        disposition: Option<String>,
    },
    /// Parsed JSON body from the API.
    Record(Value),
    /// The existence probe answered with something other than 200.
    Missing { status: u16 },
}

/// Turns one backend result into an [`Outcome`].
///
/// Pure over its inputs: the same result and timestamp always give the same outcome.
pub fn classify(
    id: &ContractId,
    result: &Result<RawResponse, HarvestError>,
    at: DateTime<Utc>,
) -> Outcome {
    let timestamp = at.to_rfc3339();
    match result {
        Ok(RawResponse::Document { bytes, disposition }) => {
            if !is_attachment(disposition.as_deref()) {
                return failed(
                    id,
                    FailureStatus::Unknown,
                    "no attachment disposition on download",
                    timestamp,
                );
            }
            if bytes.is_empty() {
                return failed(id, FailureStatus::Unknown, "empty document body", timestamp);
            }
            Outcome::Success(Artifact {
                id: id.clone(),
                payload: ArtifactPayload::Document(bytes.clone()),
                captured_at: timestamp,
            })
        }
        Ok(RawResponse::Record(value)) => {
            if value.is_null() {
                return failed(id, FailureStatus::Unknown, "empty record body", timestamp);
            }
            Outcome::Success(Artifact {
                id: id.clone(),
                payload: ArtifactPayload::Record(value.clone()),
                captured_at: timestamp,
            })
        }
        Ok(RawResponse::Missing { status }) => Outcome::Skipped {
            id: id.clone(),
            reason: format!("existence probe returned {status}"),
        },
        Err(err) => failed(id, FailureStatus::from(err.status()), &err.to_string(), timestamp),
    }
}

pub fn is_attachment(disposition: Option<&str>) -> bool {
    disposition
        .map(|value| value.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false)
}

fn failed(id: &ContractId, status: FailureStatus, message: &str, timestamp: String) -> Outcome {
    Outcome::Failed(ErrorInfo {
        id: id.clone(),
        status,
        message: message.to_string(),
        timestamp,
    })
}
