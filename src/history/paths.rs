use anyhow::Result;
use serde::Serialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ChatlogPaths {
    pub chatlog_home: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ChatlogPaths> {
    let chatlog_home = match env::var("CHATLOG_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".chatlog"),
    };
    let output_dir = env_or_default_path("CHATLOG_OUTPUT_DIR", PathBuf::from("."));
    let logs_dir = env_or_default_path("CHATLOG_LOGS_DIR", chatlog_home.join("logs"));

    Ok(ChatlogPaths {
        chatlog_home,
        output_dir,
        logs_dir,
    })
}
