use assert_matches::assert_matches;

use contract_harvest::domain::{BackendKind, ContractId, FailureStatus};
use contract_harvest::error::HarvestError;

#[test]
fn parse_contract_id_valid() {
    let id: ContractId = "NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6".parse().unwrap();
    assert_eq!(id.as_str(), "NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6");
    assert_eq!(id.to_string(), "NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6");
}

#[test]
fn parse_contract_id_too_long() {
    let err = "NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6X"
        .parse::<ContractId>()
        .unwrap_err();
    assert_matches!(err, HarvestError::InvalidContractId(_));
}

#[test]
fn parse_contract_id_rejects_path_separator() {
    let err = "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k/B6"
        .parse::<ContractId>()
        .unwrap_err();
    assert_matches!(err, HarvestError::InvalidContractId(_));
}

#[test]
fn failure_status_from_optional_code() {
    assert_eq!(FailureStatus::from(Some(404)), FailureStatus::Code(404));
    assert_eq!(FailureStatus::from(None), FailureStatus::Unknown);
    assert_eq!(FailureStatus::Unknown.to_string(), "unknown");
}

#[test]
fn backend_kind_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&BackendKind::Browser).unwrap(), "\"browser\"");
    assert_eq!(BackendKind::Api.to_string(), "api");
}

#[test]
fn only_status_errors_carry_a_code() {
    let status = HarvestError::ApiStatus {
        status: 429,
        message: "slow down".to_string(),
    };
    assert_eq!(status.status(), Some(429));
    assert_eq!(HarvestError::ApiHttp("reset".to_string()).status(), None);
}

#[test]
fn parse_contract_id_rejects_url_and_path_characters() {
    for bad in [
        "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k?B6",
        "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k#B6",
        "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k%B6",
        "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k\\B6",
        "NHcmwGhtyMtHYuvj7QL1V8rdBmu3k-B6",
    ] {
        assert_matches!(bad.parse::<ContractId>(), Err(HarvestError::InvalidContractId(_)));
    }
}
