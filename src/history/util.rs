use crate::history::model::ChatRef;
use crate::history::render::OutputFormat;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Keep ids usable as file name components.
pub fn sanitize_slug(input: &str) -> String {
    let slug: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "chat".to_string()
    } else {
        slug
    }
}

fn file_stem(chat: &ChatRef) -> String {
    format!(
        "{}_{}_chat_history",
        sanitize_slug(&chat.chat_id),
        chat.chat_type
    )
}

pub fn document_path(
    dir: &Path,
    chat: &ChatRef,
    format: OutputFormat,
    at: DateTime<Utc>,
) -> PathBuf {
    dir.join(format!(
        "{}_{}.{}",
        file_stem(chat),
        at.format("%Y%m%d-%H%M%S"),
        format.extension()
    ))
}

pub fn repair_path(dir: &Path, chat: &ChatRef, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}_repair.{}", file_stem(chat), format.extension()))
}

pub fn spool_path(dir: &Path, chat: &ChatRef) -> PathBuf {
    dir.join(format!("{}.spool", file_stem(chat)))
}

/// Rough wall time for a walk at the observed ~360 messages per second.
pub fn estimated_runtime_secs(message_count: u64) -> u64 {
    message_count.div_ceil(360)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::model::ChatType;
    use chrono::TimeZone;

    #[test]
    fn document_names_follow_chat_and_timestamp() {
        let chat = ChatRef::new(ChatType::Direct, "123/45");
        let at = Utc.with_ymd_and_hms(2021, 3, 1, 9, 5, 7).single().expect("time");
        let dir = Path::new("/out");
        assert_eq!(
            document_path(dir, &chat, OutputFormat::Html, at),
            PathBuf::from("/out/123_45_direct_chat_history_20210301-090507.html")
        );
        assert_eq!(
            repair_path(dir, &chat, OutputFormat::Markdown),
            PathBuf::from("/out/123_45_direct_chat_history_repair.md")
        );
        assert_eq!(
            spool_path(dir, &chat),
            PathBuf::from("/out/123_45_direct_chat_history.spool")
        );
    }

    #[test]
    fn runtime_estimate_rounds_up() {
        assert_eq!(estimated_runtime_secs(0), 0);
        assert_eq!(estimated_runtime_secs(1), 1);
        assert_eq!(estimated_runtime_secs(720), 2);
    }
}
