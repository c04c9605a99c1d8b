//! Configuration loader and validator for the ads report downloader.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub ads: Ads,
    #[serde(default)]
    pub report: ReportParams,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub job_timeout_seconds: u64,
    #[serde(default = "default_max_status_failures")]
    pub max_status_failures: u32,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

/// Ads API endpoint and account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ads {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub account_id: String,
    pub bearer_token: String,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Report shaping parameters. Everything is optional here because CLI flags
/// may supply or override any of them; presence is checked when the job
/// template is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportParams {
    pub entity: Option<String>,
    pub metric_groups: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub granularity: Option<String>,
    pub placement: Option<String>,
    pub segmentation_type: Option<String>,
    #[serde(default)]
    pub with_deleted: bool,
    pub output: Option<PathBuf>,
}

fn default_max_status_failures() -> u32 {
    3
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://ads-api.twitter.com/".into()
}

fn default_api_version() -> String {
    "12".into()
}

impl App {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.job_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("app.job_timeout_seconds must be > 0"));
    }
    if cfg.app.max_concurrent_jobs == 0 {
        return Err(ConfigError::Invalid("app.max_concurrent_jobs must be > 0"));
    }

    if Url::parse(cfg.ads.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("ads.base_url must be a valid URL"));
    }
    if cfg.ads.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("ads.api_version must be non-empty"));
    }
    if cfg.ads.account_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ads.account_id must be non-empty"));
    }
    if cfg.ads.bearer_token.trim().is_empty() {
        return Err(ConfigError::Invalid("ads.bearer_token must be non-empty"));
    }
    if cfg.ads.connect_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("ads.connect_timeout_seconds must be > 0"));
    }
    if cfg.ads.request_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("ads.request_timeout_seconds must be > 0"));
    }

    Ok(())
}

/// Returns a reference configuration file.
pub fn example() -> &'static str {
    r#"app:
  job_timeout_seconds: 600
  max_status_failures: 3
  max_concurrent_jobs: 1

ads:
  base_url: "https://ads-api.twitter.com/"
  api_version: "12"
  account_id: "YOUR_ADS_ACCOUNT_ID"
  bearer_token: "YOUR_ADS_API_TOKEN"
  connect_timeout_seconds: 10
  request_timeout_seconds: 60

report:
  entity: "CAMPAIGN"
  metric_groups: "ENGAGEMENT, BILLING"
  start_time: "2026-10-01T00:00:00Z"
  end_time: "2026-10-08T00:00:00Z"
  granularity: "DAY"
  placement: "ALL_ON_TWITTER"
  with_deleted: false
  output: "./report.json"
"#
}
