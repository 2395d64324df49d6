use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use crate::assets::ensure_stylesheet;
use crate::commands::{CommandReport, cancel_on_interrupt, lookup_self_id, resolve_token};
use crate::groupme::client::GroupMeClient;
use crate::history::audit;
use crate::history::config::load_config;
use crate::history::fetcher::PageFetcher;
use crate::history::model::{ChatRef, ChatType};
use crate::history::paths::resolve_paths;
use crate::history::render::{OutputFormat, renderer_for};
use crate::history::retrieval::{DocumentTarget, document_title, retrieve_document};
use crate::history::util::{document_path, estimated_runtime_secs, spool_path};
use crate::history::walker::HistoryWalker;

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub chat_type: ChatType,
    pub chat_id: String,
    pub format: Option<OutputFormat>,
    pub out_dir: Option<PathBuf>,
    pub token: Option<String>,
}

pub fn run(opts: &RetrieveOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let token = resolve_token(opts.token.as_deref())?;
    let paths = resolve_paths()?;
    let format = match opts.format {
        Some(format) => format,
        None => cfg.output_format()?,
    };
    let out_dir = opts.out_dir.clone().unwrap_or_else(|| paths.output_dir.clone());
    let settings = cfg.walk_settings()?;
    let chat = ChatRef::new(opts.chat_type, opts.chat_id.trim());
    let chat_label = chat.to_string();

    let client = GroupMeClient::new(&cfg.api, &token)?;
    let mut report = CommandReport::new("retrieve");
    let cancel = cancel_on_interrupt(&mut report);
    let walker =
        HistoryWalker::new(&client, chat.clone(), settings.clone())?.with_cancel(cancel);
    report.detail(format!("chat={chat_label}"));

    let count = match client.message_count(&chat) {
        Ok(count) => count,
        Err(failure) => {
            report.detail(format!("message count unavailable: {}", failure.reason()));
            None
        }
    };
    if count == Some(0) {
        report.detail("chat contains no messages");
        audit::record(&paths, "retrieve", "started", &chat_label, "message_count=0");
        audit::record(&paths, "retrieve", "empty", &chat_label, "no messages");
        return Ok(report);
    }
    if let Some(count) = count {
        report.detail(format!("message_count={count}"));
        report.detail(format!(
            "estimated_runtime_secs={}",
            estimated_runtime_secs(count)
        ));
    }

    let self_id = lookup_self_id(&client, &mut report);
    let renderer = renderer_for(format, settings.clock, self_id);
    let target = DocumentTarget {
        spool_path: spool_path(&out_dir, &chat),
        final_path: document_path(&out_dir, &chat, format, Utc::now()),
        title: document_title(&chat),
    };

    audit::record(
        &paths,
        "retrieve",
        "started",
        &chat_label,
        &format!("page_size={} format={format}", settings.page_size),
    );
    let outcome = match retrieve_document(&walker, None, count, renderer, &target) {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::record(&paths, "retrieve", "failed", &chat_label, &format!("{err:#}"));
            return Err(err);
        }
    };

    let Some(document) = &outcome.document else {
        report.detail("chat contains no messages");
        audit::record(&paths, "retrieve", "empty", &chat_label, "no messages");
        return Ok(report);
    };
    report.detail(format!("document={}", document.path.display()));
    report.detail(format!("messages={}", document.message_lines));
    report.detail(format!("days={}", document.marker_lines));
    report.detail(format!("pages={}", outcome.walk.pages_fetched));

    if format == OutputFormat::Html
        && cfg.output.write_stylesheet
        && let Some(css) = ensure_stylesheet(&out_dir)?
    {
        report.detail(format!("stylesheet={}", css.display()));
    }

    match outcome.checkpoint() {
        Some(checkpoint) => {
            report.issue(format!(
                "walk interrupted at {} ({}); run `chatlog repair --file {}`",
                checkpoint.cursor,
                checkpoint.failure_reason,
                document.path.display()
            ));
            audit::record(
                &paths,
                "retrieve",
                "interrupted",
                &chat_label,
                &format!("cursor={} reason={}", checkpoint.cursor, checkpoint.failure_reason),
            );
        }
        None => {
            audit::record(
                &paths,
                "retrieve",
                "completed",
                &chat_label,
                &format!("messages={}", document.message_lines),
            );
        }
    }
    Ok(report)
}
