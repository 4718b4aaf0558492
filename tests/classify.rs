use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;

use contract_harvest::classify::{RawResponse, classify};
use contract_harvest::domain::{ArtifactPayload, ContractId, FailureStatus, Outcome};
use contract_harvest::error::HarvestError;

fn contract() -> ContractId {
    "BSZptCjvXtnIklDi9AGi3oCV8PHXydNv".parse().unwrap()
}

fn at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[test]
fn attachment_download_is_success() {
    let result = Ok(RawResponse::Document {
        bytes: b"%PDF".to_vec(),
        disposition: Some("Attachment; filename=\"c.pdf\"".to_string()),
    });
    let outcome = classify(&contract(), &result, at());
    assert_matches!(
        outcome,
        Outcome::Success(artifact) if artifact.payload == ArtifactPayload::Document(b"%PDF".to_vec())
    );
}

#[test]
fn inline_download_is_failure() {
    let result = Ok(RawResponse::Document {
        bytes: b"%PDF".to_vec(),
        disposition: Some("inline".to_string()),
    });
    let outcome = classify(&contract(), &result, at());
    assert_matches!(outcome, Outcome::Failed(info) if info.status == FailureStatus::Unknown);
}

#[test]
fn record_body_is_success() {
    let result = Ok(RawResponse::Record(json!({ "contract": "x" })));
    assert_matches!(classify(&contract(), &result, at()), Outcome::Success(_));

    let empty = Ok(RawResponse::Record(serde_json::Value::Null));
    assert_matches!(classify(&contract(), &empty, at()), Outcome::Failed(_));
}

#[test]
fn probe_miss_is_skipped() {
    let result = Ok(RawResponse::Missing { status: 404 });
    assert_matches!(
        classify(&contract(), &result, at()),
        Outcome::Skipped { reason, .. } if reason.contains("404")
    );
}

#[test]
fn errors_carry_status_and_timestamp() {
    let result = Err(HarvestError::ApiStatus {
        status: 500,
        message: "boom".to_string(),
    });
    let outcome = classify(&contract(), &result, at());
    let Outcome::Failed(info) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(info.status, FailureStatus::Code(500));
    assert_eq!(info.timestamp, "2024-05-01T12:00:00+00:00");
    assert!(info.message.contains("boom"));

    let timeout = Err(HarvestError::BrowserTimeout("#download".to_string()));
    assert_matches!(
        classify(&contract(), &timeout, at()),
        Outcome::Failed(info) if info.status == FailureStatus::Unknown
    );
}

#[test]
fn classification_is_repeatable() {
    let results = [
        Ok(RawResponse::Record(json!([1, 2]))),
        Ok(RawResponse::Missing { status: 403 }),
        Err(HarvestError::ApiHttp("connection reset".to_string())),
    ];
    for result in &results {
        let first = classify(&contract(), result, at());
        let second = classify(&contract(), result, at());
        assert_eq!(first, second);
    }
}
