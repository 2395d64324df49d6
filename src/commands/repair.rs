use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, cancel_on_interrupt, lookup_self_id, resolve_token};
use crate::error::HistoryError;
use crate::groupme::client::GroupMeClient;
use crate::history::audit;
use crate::history::config::load_config;
use crate::history::document::read_document;
use crate::history::merge::merge_documents;
use crate::history::model::ChatRef;
use crate::history::paths::resolve_paths;
use crate::history::render::{OutputFormat, renderer_for};
use crate::history::retrieval::{DocumentTarget, document_title, retrieve_document};
use crate::history::util::{document_path, repair_path, spool_path};
use crate::history::walker::HistoryWalker;

#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub file: PathBuf,
    pub remove_original: bool,
    pub token: Option<String>,
}

pub fn run(opts: &RepairOptions) -> Result<CommandReport> {
    let (original, markup) = read_document(&opts.file)?;
    let checkpoint = original.checkpoint().cloned().ok_or_else(|| {
        HistoryError::Merge(format!(
            "{} carries no interruption checkpoint; nothing to repair",
            opts.file.display()
        ))
    })?;
    let format = original.format;
    let chat = checkpoint.chat.clone();
    let chat_label = chat.to_string();
    let dir = match opts.file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let cfg = load_config()?;
    let token = resolve_token(opts.token.as_deref())?;
    let paths = resolve_paths()?;
    let settings = cfg.walk_settings()?;
    let client = GroupMeClient::new(&cfg.api, &token)?;
    let mut report = CommandReport::new("repair");
    let cancel = cancel_on_interrupt(&mut report);
    let walker =
        HistoryWalker::new(&client, chat.clone(), settings.clone())?.with_cancel(cancel);
    report.detail(format!("chat={chat_label}"));
    report.detail(format!("resume_cursor={}", checkpoint.cursor));
    report.detail(format!("original_failure={}", checkpoint.failure_reason));
    report.detail(format!(
        "original_messages={}",
        original.message_line_count(markup.as_ref())
    ));
    report.detail(format!(
        "original_days={}",
        original.marker_line_count(markup.as_ref())
    ));

    let self_id = lookup_self_id(&client, &mut report);
    let target = DocumentTarget {
        spool_path: spool_path(&dir, &chat),
        final_path: repair_path(&dir, &chat, format),
        title: document_title(&chat),
    };

    audit::record(
        &paths,
        "repair",
        "started",
        &chat_label,
        &format!("cursor={}", checkpoint.cursor),
    );
    let renderer = renderer_for(format, settings.clock, self_id);
    let outcome = match retrieve_document(&walker, Some(&checkpoint), None, renderer, &target) {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::record(&paths, "repair", "failed", &chat_label, &format!("{err:#}"));
            return Err(err);
        }
    };
    let Some(continuation) = outcome.document else {
        return Err(HistoryError::Merge("repair walk produced no continuation".to_string()).into());
    };
    report.detail(format!("recovered_messages={}", continuation.message_lines));

    let merged_path = merged_path_for(&dir, &opts.file, &chat, format);
    let merged = match merge_documents(
        &opts.file,
        &continuation.path,
        &merged_path,
        opts.remove_original,
    ) {
        Ok(merged) => merged,
        Err(err) => {
            audit::record(&paths, "repair", "merge_failed", &chat_label, &format!("{err:#}"));
            return Err(err);
        }
    };
    report.detail(format!("merged={}", merged.merged_path.display()));
    report.detail(format!("messages={}", merged.message_lines));
    report.detail(format!(
        "boundary_date_duplicated={}",
        merged.boundary_date_duplicated
    ));
    if opts.remove_original {
        report.detail(format!("removed={}", opts.file.display()));
    }

    match &merged.checkpoint {
        Some(again) => {
            report.issue(format!(
                "repair walk interrupted at {} ({}); run `chatlog repair --file {}` again",
                again.cursor,
                again.failure_reason,
                merged.merged_path.display()
            ));
            audit::record(
                &paths,
                "repair",
                "interrupted",
                &chat_label,
                &format!("cursor={} reason={}", again.cursor, again.failure_reason),
            );
        }
        None => {
            audit::record(
                &paths,
                "repair",
                "completed",
                &chat_label,
                &format!("messages={}", merged.message_lines),
            );
        }
    }
    Ok(report)
}

/// A fresh timestamped name, never the original's own path.
fn merged_path_for(
    dir: &Path,
    original: &Path,
    chat: &ChatRef,
    format: OutputFormat,
) -> PathBuf {
    let candidate = document_path(dir, chat, format, Utc::now());
    if candidate == original {
        return candidate.with_extension(format!("merged.{}", format.extension()));
    }
    candidate
}
