//! Application configuration for OTWatch.
//!
//! User config lives at `~/.otwatch/otwatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OtWatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "otwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".otwatch";

// ---------------------------------------------------------------------------
// Config structs (matching otwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feed endpoint and throttling settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Model backend settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Relevance classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Monitoring cadence and file locations.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed query endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Page size for paginated window queries.
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,

    /// Minimum ms between requests without a credential.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Minimum ms between requests with a credential.
    #[serde(default = "default_keyed_request_delay_ms")]
    pub keyed_request_delay_ms: u64,

    /// Attempts per page request before surfacing a feed error.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between retry attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            results_per_page: default_results_per_page(),
            request_delay_ms: default_request_delay_ms(),
            keyed_request_delay_ms: default_keyed_request_delay_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

impl FeedConfig {
    /// Resolve the API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Inter-request delay: smaller with a credential, larger without.
    pub fn inter_request_delay_ms(&self, has_key: bool) -> u64 {
        if has_key {
            self.keyed_request_delay_ms
        } else {
            self.request_delay_ms
        }
    }
}

fn default_base_url() -> String {
    "https://services.nvd.nist.gov/rest/json/cves/2.0".into()
}
fn default_api_key_env() -> String {
    "NVD_API_KEY".into()
}
fn default_results_per_page() -> u32 {
    2000
}
// NVD allows 5 requests per 30s without a key, 50 with one.
fn default_request_delay_ms() -> u64 {
    6000
}
fn default_keyed_request_delay_ms() -> u64 {
    600
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_feed_timeout_secs() -> u64 {
    30
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama HTTP endpoint.
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    /// Default model name.
    #[serde(default = "default_model_name")]
    pub default_model: String,

    /// Per-generation timeout.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,

    /// Hard cap on generated impact statement length, in characters.
    #[serde(default = "default_max_impact_chars")]
    pub max_impact_chars: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            default_model: default_model_name(),
            timeout_secs: default_model_timeout_secs(),
            max_impact_chars: default_max_impact_chars(),
        }
    }
}

fn default_model_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_model_name() -> String {
    "qwen2.5:latest".into()
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_max_impact_chars() -> usize {
    800
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Case-insensitive substrings gating the model confirmation step.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

/// OT/ICS indicator terms: control systems, vendors, protocols, product lines.
fn default_keywords() -> Vec<String> {
    [
        "SCADA",
        "PLC",
        "HMI",
        "ICS",
        "OT",
        "Industrial Control",
        "Siemens",
        "Rockwell",
        "Schneider",
        "Allen-Bradley",
        "Modbus",
        "DNP3",
        "OPC",
        "Profinet",
        "EtherNet/IP",
        "RTU",
        "DCS",
        "Programmable Logic Controller",
        "SIMATIC",
        "ControlLogix",
        "CompactLogix",
        "Modicon",
        "Industrial Automation",
        "Process Control",
        "Factory",
        "Manufacturing",
        "Critical Infrastructure",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Fetch window looking back from "now", in minutes.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Sleep between cycles in continuous mode, in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// Fallback window in days (initial runs, sparse feeds).
    #[serde(default = "default_fallback_days")]
    pub fallback_days: u32,

    /// Dedup cache file.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Report output file.
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            interval_minutes: default_interval_minutes(),
            fallback_days: default_fallback_days(),
            cache_path: default_cache_path(),
            report_path: default_report_path(),
        }
    }
}

fn default_window_minutes() -> u32 {
    10
}
fn default_interval_minutes() -> u32 {
    10
}
fn default_fallback_days() -> u32 {
    2
}
fn default_cache_path() -> String {
    "data/cve_cache.json".into()
}
fn default_report_path() -> String {
    "data/ot_threat_report.json".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.otwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OtWatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.otwatch/otwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OtWatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| OtWatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OtWatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OtWatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OtWatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("NVD_API_KEY"));
        assert!(toml_str.contains("qwen2.5:latest"));
        assert!(toml_str.contains("SCADA"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.feed.retry_attempts, 3);
        assert_eq!(parsed.monitor.interval_minutes, 10);
        assert_eq!(parsed.model.endpoint, "http://localhost:11434");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[feed]
request_delay_ms = 100

[classifier]
keywords = ["PLC", "Modbus"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.feed.request_delay_ms, 100);
        assert_eq!(config.feed.retry_attempts, 3);
        assert_eq!(config.classifier.keywords, vec!["PLC", "Modbus"]);
        assert_eq!(config.monitor.fallback_days, 2);
    }

    #[test]
    fn inter_request_delay_depends_on_credential() {
        let feed = FeedConfig::default();
        assert!(feed.inter_request_delay_ms(false) > feed.inter_request_delay_ms(true));
    }

    #[test]
    fn api_key_absent_env_is_none() {
        let mut feed = FeedConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        feed.api_key_env = "OTWATCH_TEST_NONEXISTENT_KEY_12345".into();
        assert!(feed.api_key().is_none());
    }
}
