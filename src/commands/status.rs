use anyhow::Result;

use crate::commands::{CommandReport, token_configured};
use crate::history::config::{load_config, resolve_config_path};
use crate::history::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("status");

    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        Some(path) => report.detail(format!("config_file={} (absent, defaults)", path.display())),
        None => report.detail("config_file=none"),
    }
    report.detail(format!("chatlog_home={}", paths.chatlog_home.display()));
    report.detail(format!("output_dir={}", paths.output_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("api.base_url={}", cfg.api.base_url));
    report.detail(format!("api.page_size={}", cfg.api.page_size));
    report.detail(format!("api.timeout_secs={}", cfg.api.timeout_secs));
    report.detail(format!("walk.retry_budget={}", cfg.walk.retry_budget));
    report.detail(format!("walk.retry_backoff_ms={}", cfg.walk.retry_backoff_ms));
    report.detail(format!("output.format={}", cfg.output.format));
    report.detail(format!("output.timezone={}", cfg.output.timezone));
    report.detail(format!(
        "output.write_stylesheet={}",
        cfg.output.write_stylesheet
    ));
    report.detail(format!(
        "token={}",
        if token_configured() { "set" } else { "missing" }
    ));

    Ok(report)
}
