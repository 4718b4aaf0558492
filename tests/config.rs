use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use contract_harvest::config::{Config, ConfigLoader, PacingConfig};
use contract_harvest::error::HarvestError;

#[test]
fn partial_config_keeps_defaults() {
    let config: Config = serde_json::from_str(
        r#"{
            "output": { "root": "/tmp/harvest", "record_batch_size": 10 },
            "pacing": { "regular_delay_ms": 500 },
            "api": { "base_url": "https://api.example.test/contract/" },
            "ceiling_factor": 2
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config);
    assert_eq!(resolved.output.record_batch_size, 10);
    assert_eq!(resolved.output.downloads_dir, "/tmp/harvest/downloads");
    assert_eq!(resolved.output.failure_log, "/tmp/harvest/error_ids.json");
    assert_eq!(resolved.pacing.regular_delay, Duration::from_millis(500));
    assert_eq!(resolved.pacing.cooldown, Duration::from_secs(60));
    assert_eq!(resolved.pacing.penalty_delay, Duration::from_secs(10));
    assert_eq!(resolved.api.base_url, "https://api.example.test/contract");
    assert_eq!(resolved.ceiling_factor, 2);
}

#[test]
fn zero_ceiling_factor_is_raised() {
    let config = Config {
        ceiling_factor: Some(0),
        ..Config::default()
    };
    assert_eq!(ConfigLoader::resolve_config(config).ceiling_factor, 1);
}

#[test]
fn pacing_defaults() {
    let pacing = PacingConfig::default();
    assert_eq!(pacing.regular_delay_ms, 3_000);
    assert_eq!(pacing.cooldown_every, 100);
    assert_eq!(pacing.cooldown_ms, 60_000);
    assert_eq!(pacing.penalty_delay_ms, 10_000);
}

#[test]
fn browser_urls_expand_identifier() {
    let resolved = ConfigLoader::resolve_config(Config::default());
    let id = "BSZptCjvXtnIklDi9AGi3oCV8PHXydNv";
    assert!(resolved.browser.page_url_for(id).contains(id));
    assert_eq!(
        resolved.browser.probe_url_for(id).unwrap(),
        format!("https://api.oxpay.com.br/contract/{id}")
    );
    assert!(resolved.browser.attempt_timeout() > resolved.browser.ready_timeout);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, HarvestError::ConfigRead(_));
}

#[test]
fn invalid_json_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("harvest.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, HarvestError::ConfigParse(_));
}

#[test]
fn browser_probe_timeout_is_configurable() {
    let config: Config = serde_json::from_str(r#"{ "browser": { "probe_timeout_secs": 7 } }"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config);
    assert_eq!(resolved.browser.probe_timeout, Duration::from_secs(7));
    assert_eq!(resolved.browser.ready_timeout, Duration::from_secs(600));
}
