use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::HarvestError;

pub const CONTRACT_ID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(String);

impl ContractId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContractId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = trimmed.len() == CONTRACT_ID_LEN
            && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(HarvestError::InvalidContractId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Api,
    Browser,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Api => write!(f, "api"),
            BackendKind::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    Document(Vec<u8>),
    Record(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: ContractId,
    pub payload: ArtifactPayload,
    pub captured_at: String,
}

/// Status recorded for a failed attempt; `Unknown` when no response code was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStatus {
    Code(u16),
    Unknown,
}

impl From<Option<u16>> for FailureStatus {
    fn from(value: Option<u16>) -> Self {
        value.map(FailureStatus::Code).unwrap_or(FailureStatus::Unknown)
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStatus::Code(code) => write!(f, "{code}"),
            FailureStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for FailureStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FailureStatus::Code(code) => serializer.serialize_u16(*code),
            FailureStatus::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub id: ContractId,
    pub status: FailureStatus,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Artifact),
    Skipped { id: ContractId, reason: String },
    Failed(ErrorInfo),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_contract_id_valid() {
        let id: ContractId = "  BSZptCjvXtnIklDi9AGi3oCV8PHXydNv ".parse().unwrap();
        assert_eq!(id.as_str(), "BSZptCjvXtnIklDi9AGi3oCV8PHXydNv");
    }

    #[test]
    fn parse_contract_id_wrong_length() {
        let err = "BSZptCjvXtnIklDi9AGi3oCV8PHXydN".parse::<ContractId>().unwrap_err();
        assert_matches!(err, HarvestError::InvalidContractId(_));
    }

    #[test]
    fn failure_status_serializes_as_number_or_sentinel() {
        assert_eq!(serde_json::to_string(&FailureStatus::Code(502)).unwrap(), "502");
        assert_eq!(
            serde_json::to_string(&FailureStatus::Unknown).unwrap(),
            "\"unknown\""
        );
    }
}
