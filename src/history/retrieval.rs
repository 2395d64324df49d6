use crate::error::WarnCode;
use crate::history::fetcher::PageFetcher;
use crate::history::model::{ChatRef, Checkpoint, LatestRecord, WalkResult};
use crate::history::render::{DocumentRecord, Renderer};
use crate::history::walker::{HistoryWalker, WalkOutcome};
use crate::history::warn::{self, WarnEvent};
use crate::history::writer::{DocumentWriter, FinalizedDocument};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Where one walk spools and where its document lands.
#[derive(Debug, Clone)]
pub struct DocumentTarget {
    pub spool_path: PathBuf,
    pub final_path: PathBuf,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub walk: WalkOutcome,
    /// `None` when a fresh walk found no messages at all.
    pub document: Option<FinalizedDocument>,
}

impl RetrievalOutcome {
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.walk.result.checkpoint()
    }
}

pub fn document_title(chat: &ChatRef) -> String {
    format!("Chat history: {} chat {}", chat.chat_type, chat.chat_id)
}

/// Trailer for a finished walk: the checkpoint when interrupted, then the
/// latest-message record.
pub fn trailer_records(
    chat: &ChatRef,
    outcome: &WalkOutcome,
    resumed_from: Option<&Checkpoint>,
) -> Vec<DocumentRecord> {
    let mut records = Vec::with_capacity(2);
    if let WalkResult::Interrupted(checkpoint) = &outcome.result {
        records.push(DocumentRecord::Checkpoint(checkpoint.clone()));
    }
    records.push(DocumentRecord::Latest(LatestRecord {
        chat: chat.clone(),
        message_id: outcome.newest.as_ref().map(|m| m.id.clone()),
        date_key: outcome.newest.as_ref().map(|m| m.date_key),
        resumed_from: resumed_from.map(|c| c.cursor.clone()),
        message_count: outcome.messages_consumed,
    }));
    records
}

/// Runs one walk through a fresh [`DocumentWriter`] and finalizes it.
pub fn retrieve_document<F: PageFetcher>(
    walker: &HistoryWalker<F>,
    resume: Option<&Checkpoint>,
    remaining: Option<u64>,
    renderer: Box<dyn Renderer>,
    target: &DocumentTarget,
) -> Result<RetrievalOutcome> {
    let mut writer = DocumentWriter::create(&target.spool_path, renderer)?;
    let walk = match walker.walk(resume, remaining, &mut writer) {
        Ok(walk) => walk,
        Err(err) => {
            discard_spool(writer, &target.spool_path);
            return Err(err);
        }
    };

    if resume.is_none() && walk.messages_consumed == 0 {
        writer.discard()?;
        return Ok(RetrievalOutcome {
            walk,
            document: None,
        });
    }

    let trailer = trailer_records(walker.chat(), &walk, resume);
    let document = writer.finalize(&target.final_path, &target.title, &trailer)?;
    Ok(RetrievalOutcome {
        walk,
        document: Some(document),
    })
}

fn discard_spool(writer: DocumentWriter, spool_path: &Path) {
    if let Err(err) = writer.discard() {
        let reason = format!("{err:#}");
        let spool = spool_path.display().to_string();
        warn::emit(WarnEvent {
            action: "discard",
            cursor: &spool,
            reason: &reason,
            ..WarnEvent::new(WarnCode::W005SpoolCleanup, "retrieve")
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{html, settings, target};
    use super::*;
    use crate::error::FetchFailure;
    use crate::history::document::read_document;
    use crate::history::fetcher::testing::{ScriptedFetcher, sample_messages};
    use crate::history::model::{ChatType, DayClock};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn chat() -> ChatRef {
        ChatRef::new(ChatType::Group, "42")
    }

    #[test]
    fn completed_walk_writes_every_message_once_in_order() {
        let tmp = tempdir().expect("tempdir");
        let messages = sample_messages(257, 1200);
        let fetcher = ScriptedFetcher::new(messages.clone()).with_count();
        let walker = HistoryWalker::new(&fetcher, chat(), settings(100)).expect("walker");

        let out = retrieve_document(&walker, None, Some(257), html(), &target(tmp.path(), "full"))
            .expect("retrieve");
        let doc = out.document.expect("document");
        assert_eq!(doc.message_lines, 257);
        assert_eq!(fetcher.call_count(), 3);
        assert!(!tmp.path().join("full.spool").exists());

        let (parsed, renderer) = read_document(&doc.path).expect("read");
        assert_eq!(parsed.message_line_count(renderer.as_ref()), 257);
        assert!(parsed.checkpoint().is_none());
        let latest = parsed.latest().expect("latest");
        assert_eq!(latest.message_id.as_deref(), Some("m0257"));
        assert_eq!(latest.message_count, 257);

        // Creation-day marker opens the body; days are distinct and ordered.
        let first_day = DayClock::Zone(chrono_tz::UTC).day_of(&messages[0]);
        assert_eq!(
            parsed.body[0],
            renderer.render(&crate::history::render::RenderedLine::DateMarker(first_day))
        );
        let markers: Vec<&String> = parsed
            .body
            .iter()
            .filter(|line| renderer.is_date_marker(line))
            .collect();
        let distinct: BTreeSet<&String> = markers.iter().copied().collect();
        assert_eq!(markers.len(), distinct.len());
        assert_eq!(markers.len(), 4);
    }

    #[test]
    fn rerunning_against_a_static_chat_is_byte_identical() {
        let tmp = tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new(sample_messages(120, 3000));
        let walker = HistoryWalker::new(&fetcher, chat(), settings(50)).expect("walker");

        let first = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "a"))
            .expect("first")
            .document
            .expect("doc");
        let second = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "b"))
            .expect("second")
            .document
            .expect("doc");
        assert_eq!(
            fs::read(first.path).expect("read a"),
            fs::read(second.path).expect("read b")
        );
    }

    #[test]
    fn interrupted_walk_keeps_consumed_lines_and_one_checkpoint() {
        let tmp = tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new(sample_messages(300, 900))
            .fail_on(3, FetchFailure::fault("http 500"));
        let walker = HistoryWalker::new(&fetcher, chat(), settings(100)).expect("walker");

        let out = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "partial"))
            .expect("retrieve");
        let walked = out.checkpoint().cloned();
        let doc = out.document.expect("document");
        let (parsed, renderer) = read_document(&doc.path).expect("read");
        assert_eq!(parsed.message_line_count(renderer.as_ref()), 200);
        let checkpoint = parsed.checkpoint().expect("checkpoint");
        assert_eq!(checkpoint.cursor, "m0101");
        assert_eq!(Some(checkpoint), walked.as_ref());
    }

    #[test]
    fn empty_chat_produces_no_document() {
        let tmp = tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new(Vec::new());
        let walker = HistoryWalker::new(&fetcher, chat(), settings(100)).expect("walker");

        let out = retrieve_document(&walker, None, None, html(), &target(tmp.path(), "empty"))
            .expect("retrieve");
        assert!(out.document.is_none());
        assert!(!tmp.path().join("empty.spool").exists());
        assert!(!tmp.path().join("empty.html").exists());
    }

    #[test]
    fn failed_first_fetch_leaves_nothing_behind() {
        let tmp = tempdir().expect("tempdir");
        let fetcher =
            ScriptedFetcher::new(sample_messages(5, 60)).fail_on(1, FetchFailure::fault("http 404"));
        let walker = HistoryWalker::new(&fetcher, chat(), settings(100)).expect("walker");

        assert!(retrieve_document(&walker, None, None, html(), &target(tmp.path(), "x")).is_err());
        assert!(!tmp.path().join("x.spool").exists());
    }
}
