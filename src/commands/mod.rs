pub mod chats;
pub mod repair;
pub mod retrieve;
pub mod status;

use crate::error::HistoryError;
use crate::groupme::client::GroupMeClient;
use crate::history::walker::CancelToken;
use serde::Serialize;
use std::env;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

const TOKEN_VARS: [&str; 2] = ["CHATLOG_TOKEN", "GROUPME_TOKEN"];

/// Access token from the flag, then the environment.
pub fn resolve_token(flag: Option<&str>) -> Result<String, HistoryError> {
    if let Some(token) = flag.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    for var in TOKEN_VARS {
        if let Ok(v) = env::var(var)
            && !v.trim().is_empty()
        {
            return Ok(v.trim().to_string());
        }
    }
    Err(HistoryError::Configuration(format!(
        "no access token; pass --token or set {}",
        TOKEN_VARS.join(" or ")
    )))
}

pub fn token_configured() -> bool {
    resolve_token(None).is_ok()
}

/// Owner id for self highlighting; a failed lookup only disables highlighting.
pub fn lookup_self_id(client: &GroupMeClient, report: &mut CommandReport) -> Option<String> {
    match client.self_user_id() {
        Ok(id) => Some(id),
        Err(err) => {
            report.detail(format!("self highlighting disabled: {err:#}"));
            None
        }
    }
}

/// Token cancelled by Ctrl-C. The walk stops before its next page and still
/// writes a repairable document.
pub fn cancel_on_interrupt(report: &mut CommandReport) -> CancelToken {
    let token = CancelToken::default();
    let handle = token.clone();
    if let Err(err) = ctrlc::set_handler(move || handle.cancel()) {
        report.detail(format!("interrupt handler unavailable: {err}"));
    }
    token
}
