use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::controller::DEFAULT_CEILING_FACTOR;
use crate::error::HarvestError;
use crate::pacing::PacingPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "harvest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub ceiling_factor: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: String,
    pub downloads_dir: String,
    pub data_dir: String,
    pub failure_log: String,
    pub archive: String,
    pub document_extension: String,
    pub record_batch_size: usize,
    pub checkpoint: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            downloads_dir: "downloads".to_string(),
            data_dir: "data".to_string(),
            failure_log: "error_ids.json".to_string(),
            archive: "contracts.zip".to_string(),
            document_extension: "pdf".to_string(),
            record_batch_size: 50,
            checkpoint: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PacingConfig {
    pub regular_delay_ms: u64,
    pub cooldown_every: u64,
    pub cooldown_ms: u64,
    pub penalty_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            regular_delay_ms: 3_000,
            cooldown_every: 100,
            cooldown_ms: 60_000,
            penalty_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.oxpay.com.br/contract".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub page_url: String,
    pub probe_url: Option<String>,
    pub probe_timeout_secs: u64,
    pub settle_ms: u64,
    pub ready_selector: String,
    pub ready_timeout_secs: u64,
    pub capture_timeout_secs: u64,
    pub headless: bool,
    pub executable: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            page_url: "https://web-oxpay.netlify.app/contract/{id}/1".to_string(),
            probe_url: Some("https://api.oxpay.com.br/contract/{id}".to_string()),
            probe_timeout_secs: 30,
            settle_ms: 5_000,
            ready_selector: "#download".to_string(),
            ready_timeout_secs: 600,
            capture_timeout_secs: 15,
            headless: true,
            executable: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: Utf8PathBuf,
    pub downloads_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub failure_log: Utf8PathBuf,
    pub archive: Utf8PathBuf,
    pub document_extension: String,
    pub record_batch_size: usize,
    pub checkpoint: Option<Utf8PathBuf>,
}

impl OutputLayout {
    /// Default layout rooted at `root`.
    pub fn under(root: Utf8PathBuf) -> Self {
        let defaults = OutputConfig {
            root: root.to_string(),
            ..OutputConfig::default()
        };
        Self::from(defaults)
    }
}

impl From<OutputConfig> for OutputLayout {
    fn from(value: OutputConfig) -> Self {
        let root = Utf8PathBuf::from(value.root);
        Self {
            downloads_dir: root.join(value.downloads_dir),
            data_dir: root.join(value.data_dir),
            failure_log: root.join(value.failure_log),
            archive: root.join(value.archive),
            document_extension: value.document_extension,
            record_batch_size: value.record_batch_size.max(1),
            checkpoint: value.checkpoint.map(|path| root.join(path)),
            root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub page_url: String,
    pub probe_url: Option<String>,
    pub probe_timeout: Duration,
    pub settle: Duration,
    pub ready_selector: String,
    pub ready_timeout: Duration,
    pub capture_timeout: Duration,
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

impl BrowserSettings {
    pub fn page_url_for(&self, id: &str) -> String {
        expand_template(&self.page_url, id)
    }

    pub fn probe_url_for(&self, id: &str) -> Option<String> {
        self.probe_url
            .as_deref()
            .map(|template| expand_template(template, id))
    }

    /// Upper bound for one interactive attempt; the controller never waits longer.
    pub fn attempt_timeout(&self) -> Duration {
        self.settle + self.ready_timeout + self.capture_timeout
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output: OutputLayout,
    pub pacing: PacingPolicy,
    pub api: ApiSettings,
    pub browser: BrowserSettings,
    pub ceiling_factor: u32,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Self::resolve_config(Config::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let Config {
            output,
            pacing,
            api,
            browser,
            ceiling_factor,
        } = config;

        ResolvedConfig {
            output: OutputLayout::from(output),
            pacing: PacingPolicy::from(&pacing),
            api: ApiSettings {
                base_url: api.base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(api.timeout_secs),
            },
            browser: BrowserSettings {
                page_url: browser.page_url,
                probe_url: browser.probe_url,
                probe_timeout: Duration::from_secs(browser.probe_timeout_secs),
                settle: Duration::from_millis(browser.settle_ms),
                ready_selector: browser.ready_selector,
                ready_timeout: Duration::from_secs(browser.ready_timeout_secs),
                capture_timeout: Duration::from_secs(browser.capture_timeout_secs),
                headless: browser.headless,
                executable: browser.executable.map(PathBuf::from),
            },
            ceiling_factor: ceiling_factor.unwrap_or(DEFAULT_CEILING_FACTOR).max(1),
        }
    }
}

fn expand_template(template: &str, id: &str) -> String {
    if template.contains("{id}") {
        template.replace("{id}", id)
    } else {
        format!("{}/{id}", template.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let resolved = ConfigLoader::resolve_config(Config::default());
        assert_eq!(resolved.ceiling_factor, 3);
        assert_eq!(resolved.output.record_batch_size, 50);
        assert!(resolved.output.archive.ends_with("contracts.zip"));
        assert_eq!(resolved.browser.ready_timeout, Duration::from_secs(600));
        assert_eq!(resolved.browser.probe_timeout, Duration::from_secs(30));
    }

    #[test]
    fn template_without_placeholder_appends_id() {
        assert_eq!(expand_template("https://x.test/c/", "abc"), "https://x.test/c/abc");
        assert_eq!(expand_template("https://x.test/{id}/1", "abc"), "https://x.test/abc/1");
    }
}
