use crate::error::HistoryError;
use crate::history::model::DayClock;
use crate::history::render::OutputFormat;
use crate::history::walker::{MAX_PAGE_SIZE, RetryPolicy, WalkSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groupme.com/v3".to_string(),
            page_size: MAX_PAGE_SIZE,
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub retry_budget: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            retry_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String,
    /// IANA zone name, or `local`.
    pub timezone: String,
    pub write_stylesheet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Html.to_string(),
            timezone: "local".to_string(),
            write_stylesheet: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    pub api: ApiConfig,
    pub walk: WalkConfig,
    pub output: OutputConfig,
}

impl HistoryConfig {
    pub fn output_format(&self) -> Result<OutputFormat, HistoryError> {
        self.output
            .format
            .parse::<OutputFormat>()
            .map_err(HistoryError::Configuration)
    }

    pub fn day_clock(&self) -> Result<DayClock, HistoryError> {
        DayClock::parse(Some(&self.output.timezone)).map_err(HistoryError::Configuration)
    }

    pub fn walk_settings(&self) -> Result<WalkSettings, HistoryError> {
        Ok(WalkSettings {
            page_size: self.api.page_size,
            retry: RetryPolicy {
                budget: self.walk.retry_budget,
                backoff: Duration::from_millis(self.walk.retry_backoff_ms),
            },
            clock: self.day_clock()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialHistoryConfig {
    api: Option<ApiConfig>,
    walk: Option<WalkConfig>,
    output: Option<OutputConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

/// Narrows an env-provided integer, rejecting values the field cannot hold.
fn narrow_env<T: TryFrom<u64>>(var: &str, value: u64) -> Result<T, HistoryError> {
    T::try_from(value)
        .map_err(|_| HistoryError::Configuration(format!("{var}={value} is out of range")))
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &HistoryConfig) -> Result<(), HistoryError> {
    let invalid = |msg: String| Err(HistoryError::Configuration(msg));
    if cfg.api.page_size == 0 || cfg.api.page_size > MAX_PAGE_SIZE {
        return invalid(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
            cfg.api.page_size
        ));
    }
    if cfg.api.timeout_secs == 0 {
        return invalid("request timeout must be >= 1 second".to_string());
    }
    if cfg.api.base_url.trim().is_empty() {
        return invalid("api base url cannot be empty".to_string());
    }
    cfg.output_format()?;
    cfg.day_clock()?;
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATLOG_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chatlog").join("config.toml"))
}

fn merge_toml(base: &mut HistoryConfig, raw: &str) -> Result<(), toml::de::Error> {
    let parsed: PartialHistoryConfig = toml::from_str(raw)?;
    if let Some(api) = parsed.api {
        base.api = api;
    }
    if let Some(walk) = parsed.walk {
        base.walk = walk;
    }
    if let Some(output) = parsed.output {
        base.output = output;
    }
    Ok(())
}

fn merge_file_config(base: &mut HistoryConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    merge_toml(base, &raw).map_err(|err| {
        HistoryError::Configuration(format!(
            "failed to parse chatlog config {}: {err}",
            path.display()
        ))
    })?;
    Ok(())
}

fn apply_env_overrides(cfg: &mut HistoryConfig) -> Result<(), HistoryError> {
    cfg.api.base_url = env_or_string("CHATLOG_BASE_URL", &cfg.api.base_url);
    let page_size = env_or_u64("CHATLOG_PAGE_SIZE", cfg.api.page_size as u64);
    cfg.api.page_size = narrow_env("CHATLOG_PAGE_SIZE", page_size)?;
    cfg.api.timeout_secs = env_or_u64("CHATLOG_TIMEOUT_SECS", cfg.api.timeout_secs);
    let retry_budget = env_or_u64("CHATLOG_RETRY_BUDGET", u64::from(cfg.walk.retry_budget));
    cfg.walk.retry_budget = narrow_env("CHATLOG_RETRY_BUDGET", retry_budget)?;
    cfg.walk.retry_backoff_ms = env_or_u64("CHATLOG_RETRY_BACKOFF_MS", cfg.walk.retry_backoff_ms);
    cfg.output.format = env_or_string("CHATLOG_FORMAT", &cfg.output.format);
    cfg.output.timezone = env_or_string("CHATLOG_TIMEZONE", &cfg.output.timezone);
    cfg.output.write_stylesheet =
        env_or_bool("CHATLOG_WRITE_STYLESHEET", cfg.output.write_stylesheet);
    Ok(())
}

pub fn load_config() -> Result<HistoryConfig> {
    let mut cfg = HistoryConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;
    Ok(cfg)
}
