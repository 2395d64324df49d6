use crate::error::{HistoryError, WarnCode};
use crate::history::document::{ParsedDocument, read_document, write_lines};
use crate::history::model::{Checkpoint, LatestRecord};
use crate::history::render::{DocumentRecord, RenderedLine, Renderer};
use crate::history::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged_path: PathBuf,
    pub message_lines: usize,
    pub boundary_date_duplicated: bool,
    /// Set when the repair walk was itself interrupted.
    pub checkpoint: Option<Checkpoint>,
}

fn rejected(reason: impl Into<String>) -> HistoryError {
    HistoryError::Merge(reason.into())
}

/// Whether the continuation's newest day is the day the original stopped on.
pub fn boundary_date_duplicated(original: &Checkpoint, repair: &LatestRecord) -> bool {
    repair.date_key == Some(original.date_key)
}

/// Matches a continuation's latest-message record against the original's
/// interruption checkpoint.
pub fn verify_continuation<'a>(
    original: &'a ParsedDocument,
    repair: &'a ParsedDocument,
) -> Result<(&'a Checkpoint, &'a LatestRecord), HistoryError> {
    let checkpoint = original
        .checkpoint()
        .ok_or_else(|| rejected("original document carries no interruption checkpoint"))?;
    let latest = repair
        .latest()
        .ok_or_else(|| rejected("repair continuation carries no latest-message record"))?;
    if latest.chat != checkpoint.chat {
        return Err(rejected(format!(
            "repair continuation belongs to {} but the original was interrupted on {}",
            latest.chat, checkpoint.chat
        )));
    }
    if latest.resumed_from.as_deref() != Some(checkpoint.cursor.as_str()) {
        return Err(rejected(format!(
            "repair continuation resumed from {} but the original stopped at {}",
            latest.resumed_from.as_deref().unwrap_or("the newest message"),
            checkpoint.cursor
        )));
    }
    if original.format != repair.format {
        return Err(rejected(format!(
            "cannot merge a {} continuation into a {} document",
            repair.format, original.format
        )));
    }
    Ok((checkpoint, latest))
}

/// Splices a repair continuation in front of the original's body.
///
/// The continuation contributes its preamble and body. The original's leading
/// date marker is kept only when the two sides stop on different days, then
/// the rest of the original body follows. Trailer: the continuation's own
/// checkpoint if it was interrupted too, then the original's latest record
/// with the combined message count.
pub fn merge(
    original: &ParsedDocument,
    repair: &ParsedDocument,
    boundary_date_duplicated: bool,
    renderer: &dyn Renderer,
) -> Result<Vec<String>, HistoryError> {
    let (checkpoint, repair_latest) = verify_continuation(original, repair)?;

    let (boundary, original_rest) = match original.body.split_first() {
        Some((first, rest)) if renderer.is_date_marker(first) => (Some(first), rest),
        Some(_) => {
            return Err(rejected(
                "original body does not open with a date marker",
            ));
        }
        None => (None, &[][..]),
    };

    let mut merged = Vec::with_capacity(
        repair.preamble.len() + repair.body.len() + original.body.len() + 8,
    );
    merged.extend(repair.preamble.iter().cloned());
    merged.extend(repair.body.iter().cloned());
    if let Some(marker) = boundary
        && !boundary_date_duplicated
    {
        merged.push(marker.clone());
    }
    merged.extend(original_rest.iter().cloned());
    merged.push(renderer.body_close().to_string());

    let mut records = Vec::with_capacity(2);
    if let Some(next) = repair.checkpoint() {
        records.push(DocumentRecord::Checkpoint(next.clone()));
    }
    let latest = match original.latest() {
        Some(latest) => LatestRecord {
            message_count: latest.message_count + repair_latest.message_count,
            ..latest.clone()
        },
        None => LatestRecord {
            chat: checkpoint.chat.clone(),
            message_id: None,
            date_key: None,
            resumed_from: None,
            message_count: repair_latest.message_count,
        },
    };
    records.push(DocumentRecord::Latest(latest));
    for record in &records {
        merged.push(renderer.render(&RenderedLine::Record(record)));
    }
    merged.extend(original.closing.iter().cloned());
    Ok(merged)
}

/// Merges two documents on disk into `merged_path`.
///
/// Nothing is written or removed unless the merge succeeds. On success the
/// continuation file is removed; the original is removed only when
/// `remove_original` is set.
pub fn merge_documents(
    original_path: &Path,
    repair_path: &Path,
    merged_path: &Path,
    remove_original: bool,
) -> Result<MergeOutcome> {
    let (original, renderer) = read_document(original_path)?;
    let (repair, _) = read_document(repair_path)?;

    let duplicated = match (original.checkpoint(), repair.latest()) {
        (Some(checkpoint), Some(latest)) => boundary_date_duplicated(checkpoint, latest),
        _ => false,
    };
    let merged = match merge(&original, &repair, duplicated, renderer.as_ref()) {
        Ok(lines) => lines,
        Err(err) => {
            let reason = err.to_string();
            let original_name = original_path.display().to_string();
            warn::emit(WarnEvent {
                action: "abort",
                chat: &original_name,
                reason: &reason,
                ..WarnEvent::new(WarnCode::W004MergeRejected, "merge")
            });
            return Err(err.into());
        }
    };

    write_lines(merged_path, &merged)?;
    fs::remove_file(repair_path)
        .with_context(|| format!("failed to remove {}", repair_path.display()))?;
    if remove_original && original_path != merged_path {
        fs::remove_file(original_path)
            .with_context(|| format!("failed to remove {}", original_path.display()))?;
    }

    let message_lines = original.message_line_count(renderer.as_ref())
        + repair.message_line_count(renderer.as_ref());
    Ok(MergeOutcome {
        merged_path: merged_path.to_path_buf(),
        message_lines,
        boundary_date_duplicated: duplicated,
        checkpoint: repair.checkpoint().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchFailure;
    use crate::history::fetcher::testing::{CancelAfter, ScriptedFetcher, sample_messages};
    use crate::history::model::{ChatRef, ChatType};
    use crate::history::retrieval::retrieve_document;
    use crate::history::retrieval::testing::{html, settings, target};
    use crate::history::walker::{CANCELLED_REASON, CancelToken, HistoryWalker};
    use std::path::Path;
    use tempfile::tempdir;

    fn chat() -> ChatRef {
        ChatRef::new(ChatType::Group, "42")
    }

    /// Walks the full chat, then an interrupted copy plus its repair.
    /// Returns (uninterrupted, original, continuation) paths.
    fn scenario(
        dir: &Path,
        total: usize,
        step_secs: i64,
        page_size: usize,
    ) -> (PathBuf, PathBuf, PathBuf) {
        let messages = sample_messages(total, step_secs);

        let clean = ScriptedFetcher::new(messages.clone());
        let walker = HistoryWalker::new(&clean, chat(), settings(page_size)).expect("walker");
        let full = retrieve_document(&walker, None, None, html(), &target(dir, "full"))
            .expect("full")
            .document
            .expect("doc")
            .path;

        let flaky = ScriptedFetcher::new(messages.clone()).fail_on(3, FetchFailure::fault("http 500"));
        let walker = HistoryWalker::new(&flaky, chat(), settings(page_size)).expect("walker");
        let partial = retrieve_document(&walker, None, None, html(), &target(dir, "partial"))
            .expect("partial");
        let checkpoint = partial.checkpoint().expect("interrupted").clone();
        let partial = partial.document.expect("doc").path;

        let repair_source = ScriptedFetcher::new(messages);
        let walker = HistoryWalker::new(&repair_source, chat(), settings(page_size)).expect("walker");
        let repair = retrieve_document(&walker, Some(&checkpoint), None, html(), &target(dir, "repair"))
            .expect("repair")
            .document
            .expect("doc")
            .path;

        (full, partial, repair)
    }

    #[test]
    fn merge_with_shared_boundary_day_matches_uninterrupted_walk() {
        let tmp = tempdir().expect("tempdir");
        // Three messages a day; the interruption falls mid-day.
        let (full, partial, repair) = scenario(tmp.path(), 30, 8 * 3600, 10);
        let merged_path = tmp.path().join("merged.html");

        let outcome = merge_documents(&partial, &repair, &merged_path, false).expect("merge");
        assert!(outcome.boundary_date_duplicated);
        assert_eq!(outcome.message_lines, 30);
        assert!(outcome.checkpoint.is_none());
        assert!(!repair.exists());
        assert!(partial.exists());
        assert_eq!(
            fs::read_to_string(&merged_path).expect("merged"),
            fs::read_to_string(&full).expect("full")
        );
    }

    #[test]
    fn merge_with_distinct_boundary_days_keeps_both_markers() {
        let tmp = tempdir().expect("tempdir");
        // Interruption falls exactly on a day boundary.
        let (full, partial, repair) = scenario(tmp.path(), 30, 8 * 3600, 9);
        let merged_path = tmp.path().join("merged.html");

        let outcome = merge_documents(&partial, &repair, &merged_path, true).expect("merge");
        assert!(!outcome.boundary_date_duplicated);
        assert_eq!(outcome.message_lines, 30);
        assert!(!partial.exists());
        assert_eq!(
            fs::read_to_string(&merged_path).expect("merged"),
            fs::read_to_string(&full).expect("full")
        );
    }

    #[test]
    fn failure_after_last_page_repairs_to_an_empty_continuation() {
        let tmp = tempdir().expect("tempdir");
        // 200 messages: the third fetch is the one that would signal exhaustion.
        let (full, partial, repair) = scenario(tmp.path(), 200, 1800, 100);
        let (original, _) = read_document(&partial).expect("partial");
        assert_eq!(original.checkpoint().map(|c| c.cursor.as_str()), Some("m0001"));

        let merged_path = tmp.path().join("merged.html");
        let outcome = merge_documents(&partial, &repair, &merged_path, false).expect("merge");
        assert_eq!(outcome.message_lines, 200);
        assert_eq!(
            fs::read_to_string(&merged_path).expect("merged"),
            fs::read_to_string(&full).expect("full")
        );
    }

    #[test]
    fn mismatched_chat_aborts_and_leaves_inputs_untouched() {
        let tmp = tempdir().expect("tempdir");
        let (_, partial, _) = scenario(tmp.path(), 30, 8 * 3600, 10);

        let stranger = ScriptedFetcher::new(sample_messages(5, 60));
        let other_chat = ChatRef::new(ChatType::Direct, "99");
        let walker = HistoryWalker::new(&stranger, other_chat, settings(10)).expect("walker");
        let (original, _) = read_document(&partial).expect("partial");
        let checkpoint = original.checkpoint().expect("checkpoint").clone();
        let foreign = retrieve_document(&walker, Some(&checkpoint), None, html(), &target(tmp.path(), "foreign"))
            .expect("foreign")
            .document
            .expect("doc")
            .path;

        let before = fs::read(&partial).expect("read");
        let merged_path = tmp.path().join("merged.html");
        let err = merge_documents(&partial, &foreign, &merged_path, true).expect_err("mismatch");
        assert!(matches!(
            err.downcast_ref::<HistoryError>(),
            Some(HistoryError::Merge(_))
        ));
        assert!(!merged_path.exists());
        assert!(foreign.exists());
        assert_eq!(fs::read(&partial).expect("read"), before);
    }

    #[test]
    fn original_without_checkpoint_cannot_be_repaired() {
        let tmp = tempdir().expect("tempdir");
        let (full, _, repair) = scenario(tmp.path(), 30, 8 * 3600, 10);
        let (original, renderer) = read_document(&full).expect("full");
        let (continuation, _) = read_document(&repair).expect("repair");

        let err = merge(&original, &continuation, false, renderer.as_ref()).expect_err("no checkpoint");
        assert!(err.to_string().contains("no interruption checkpoint"));
    }

    #[test]
    fn interrupted_repair_hands_its_checkpoint_to_the_merged_document() {
        let tmp = tempdir().expect("tempdir");
        let messages = sample_messages(60, 8 * 3600);
        let flaky = ScriptedFetcher::new(messages.clone()).fail_on(3, FetchFailure::fault("http 500"));
        let walker = HistoryWalker::new(&flaky, chat(), settings(10)).expect("walker");
        let partial = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "partial"))
            .expect("partial");
        let first_stop = partial.checkpoint().expect("interrupted").clone();
        let partial = partial.document.expect("doc").path;

        let flaky_again =
            ScriptedFetcher::new(messages).fail_on(2, FetchFailure::fault("http 503"));
        let walker = HistoryWalker::new(&flaky_again, chat(), settings(10)).expect("walker");
        let repair = retrieve_document(&walker, Some(&first_stop), None, html(), &target(tmp.path(), "repair"))
            .expect("repair");
        let second_stop = repair.checkpoint().expect("interrupted again").clone();
        let repair = repair.document.expect("doc").path;

        let merged_path = tmp.path().join("merged.html");
        let outcome = merge_documents(&partial, &repair, &merged_path, false).expect("merge");
        assert_eq!(outcome.message_lines, 30);
        assert_eq!(outcome.checkpoint.as_ref(), Some(&second_stop));

        let (merged, _) = read_document(&merged_path).expect("merged");
        assert_eq!(merged.checkpoint(), Some(&second_stop));
        assert_eq!(second_stop.cursor, "m0031");
        assert_eq!(merged.latest().map(|l| l.message_count), Some(30));
    }

    #[test]
    fn cancelled_walk_leaves_a_repairable_document() {
        let tmp = tempdir().expect("tempdir");
        let messages = sample_messages(50, 4 * 3600);

        let clean = ScriptedFetcher::new(messages.clone());
        let walker = HistoryWalker::new(&clean, chat(), settings(10)).expect("walker");
        let full = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "full"))
            .expect("full")
            .document
            .expect("doc")
            .path;

        let scripted = ScriptedFetcher::new(messages.clone());
        let cancel = CancelToken::default();
        let cancelling = CancelAfter {
            inner: &scripted,
            after: 2,
            token: cancel.clone(),
        };
        let walker = HistoryWalker::new(&cancelling, chat(), settings(10))
            .expect("walker")
            .with_cancel(cancel);
        let partial = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "partial"))
            .expect("partial");
        let checkpoint = partial.checkpoint().expect("cancelled").clone();
        assert_eq!(checkpoint.failure_reason, CANCELLED_REASON);
        assert_eq!(checkpoint.cursor, "m0031");
        assert!(!tmp.path().join("partial.spool").exists());
        let partial = partial.document.expect("doc").path;

        let source = ScriptedFetcher::new(messages);
        let walker = HistoryWalker::new(&source, chat(), settings(10)).expect("walker");
        let repair = retrieve_document(
            &walker,
            Some(&checkpoint),
            None,
            html(),
            &target(tmp.path(), "repair"),
        )
        .expect("repair")
        .document
        .expect("doc")
        .path;

        let merged_path = tmp.path().join("merged.html");
        merge_documents(&partial, &repair, &merged_path, false).expect("merge");
        assert_eq!(
            fs::read_to_string(&merged_path).expect("merged"),
            fs::read_to_string(&full).expect("full")
        );
    }
}
