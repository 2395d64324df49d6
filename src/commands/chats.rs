use anyhow::Result;

use crate::commands::{CommandReport, resolve_token};
use crate::groupme::client::GroupMeClient;
use crate::history::config::load_config;

pub fn run(token: Option<&str>) -> Result<CommandReport> {
    let cfg = load_config()?;
    let token = resolve_token(token)?;
    let client = GroupMeClient::new(&cfg.api, &token)?;
    let mut report = CommandReport::new("chats");

    let groups = client.groups()?;
    let directs = client.direct_chats()?;
    if groups.is_empty() && directs.is_empty() {
        report.detail("no chats visible to this token");
    }
    for summary in groups.iter().chain(directs.iter()) {
        report.detail(format!(
            "{} {} {}",
            summary.chat.chat_type, summary.chat.chat_id, summary.name
        ));
    }
    Ok(report)
}
