use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use contract_harvest::config::{OutputConfig, OutputLayout};
use contract_harvest::domain::{Artifact, ArtifactPayload, ContractId, ErrorInfo, FailureStatus};
use contract_harvest::sink::{PersistenceSink, Stored};

fn contract(n: usize) -> ContractId {
    format!("{n:032}").parse().unwrap()
}

fn record(n: usize) -> Artifact {
    Artifact {
        id: contract(n),
        payload: ArtifactPayload::Record(json!({ "n": n })),
        captured_at: "2024-05-01T12:00:00+00:00".to_string(),
    }
}

fn sink_with_batch(temp: &tempfile::TempDir, batch: usize) -> PersistenceSink {
    let layout = OutputLayout::from(OutputConfig {
        root: temp.path().to_str().unwrap().to_string(),
        record_batch_size: batch,
        ..OutputConfig::default()
    });
    PersistenceSink::new(layout).unwrap()
}

#[test]
fn document_written_under_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let mut sink = sink_with_batch(&temp, 50);
    let artifact = Artifact {
        id: contract(7),
        payload: ArtifactPayload::Document(b"%PDF-1.7".to_vec()),
        captured_at: "2024-05-01T12:00:00+00:00".to_string(),
    };

    let stored = sink.store(&artifact).unwrap();

    let expected = Utf8PathBuf::from_path_buf(temp.path().join("downloads"))
        .unwrap()
        .join(format!("{}.pdf", contract(7)));
    assert_eq!(stored, Stored::Document(expected.clone()));
    assert_eq!(fs::read(&expected).unwrap(), b"%PDF-1.7");
}

#[test]
fn records_written_in_numbered_batches() {
    let temp = tempfile::tempdir().unwrap();
    let mut sink = sink_with_batch(&temp, 2);

    assert_eq!(sink.store(&record(1)).unwrap(), Stored::Buffered { pending: 1 });
    assert_matches!(sink.store(&record(2)).unwrap(), Stored::Batch(_));
    assert_eq!(sink.buffered(), 0);
    sink.store(&record(3)).unwrap();

    let flushed = sink.flush().unwrap();
    assert_eq!(flushed, Some(sink.batch_path(2)));
    assert_eq!(sink.flush().unwrap(), None);

    let first: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sink.batch_path(1)).unwrap()).unwrap();
    assert_eq!(first.as_array().unwrap().len(), 2);
    assert_eq!(first[0]["id"], contract(1).as_str());
    assert_eq!(first[0]["data"]["n"], 1);
    assert_eq!(first[0]["timestamp"], "2024-05-01T12:00:00+00:00");
}

#[test]
fn failure_log_skipped_when_empty() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_with_batch(&temp, 50);
    assert_eq!(sink.write_failure_log(&[]).unwrap(), None);
    assert!(!sink.layout().failure_log.exists());
}

#[test]
fn failure_log_uses_unknown_sentinel() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_with_batch(&temp, 50);
    let failures = vec![
        ErrorInfo {
            id: contract(1),
            status: FailureStatus::Unknown,
            message: "timed out".to_string(),
            timestamp: "2024-05-01T12:00:00+00:00".to_string(),
        },
        ErrorInfo {
            id: contract(2),
            status: FailureStatus::Code(404),
            message: "not found".to_string(),
            timestamp: "2024-05-01T12:00:03+00:00".to_string(),
        },
    ];

    let path = sink.write_failure_log(&failures).unwrap().unwrap();

    let logged: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(logged[0]["status"], "unknown");
    assert_eq!(logged[1]["status"], 404);
    assert_eq!(logged[1]["message"], "not found");
}

#[test]
fn rejected_record_is_not_kept_for_a_later_batch() {
    let temp = tempfile::tempdir().unwrap();
    let mut sink = sink_with_batch(&temp, 2);
    let data_dir = sink.layout().data_dir.clone();

    sink.store(&record(1)).unwrap();
    fs::remove_dir_all(&data_dir).unwrap();
    fs::write(&data_dir, b"not a directory").unwrap();
    assert!(sink.store(&record(2)).is_err());
    assert_eq!(sink.buffered(), 1);

    fs::remove_file(&data_dir).unwrap();
    fs::create_dir_all(&data_dir).unwrap();
    assert_matches!(sink.store(&record(3)).unwrap(), Stored::Batch(_));

    let batch: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sink.batch_path(1)).unwrap()).unwrap();
    let ids: Vec<&str> = batch
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [contract(1).as_str(), contract(3).as_str()]);
}
