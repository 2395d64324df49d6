use crate::error::WarnCode;
use crate::history::paths::ChatlogPaths;
use crate::history::util::now_epoch_secs;
use crate::history::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub chat: String,
    pub message: String,
}

pub fn append_event(
    paths: &ChatlogPaths,
    phase: &str,
    status: &str,
    chat: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        chat: chat.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.logs_dir.join("audit.log");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Appends an event without failing the command. A log that cannot be written
/// becomes a W006 warning.
pub fn record(paths: &ChatlogPaths, phase: &str, status: &str, chat: &str, message: &str) {
    if let Err(err) = append_event(paths, phase, status, chat, message) {
        let reason = format!("{err:#}");
        warn::emit(WarnEvent {
            action: status,
            chat,
            reason: &reason,
            ..WarnEvent::new(WarnCode::W006AuditWrite, phase)
        });
    }
}
