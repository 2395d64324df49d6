use crate::error::HistoryError;
use crate::history::model::{Checkpoint, DayClock, LatestRecord};
use crate::history::render::{DocumentRecord, OutputFormat, Renderer, renderer_for};
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A finished document split along its structural delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub format: OutputFormat,
    /// Lines up to and including the body-open delimiter.
    pub preamble: Vec<String>,
    pub body: Vec<String>,
    pub records: Vec<DocumentRecord>,
    pub closing: Vec<String>,
}

impl ParsedDocument {
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.records.iter().find_map(|record| match record {
            DocumentRecord::Checkpoint(checkpoint) => Some(checkpoint),
            DocumentRecord::Latest(_) => None,
        })
    }

    pub fn latest(&self) -> Option<&LatestRecord> {
        self.records.iter().find_map(|record| match record {
            DocumentRecord::Latest(latest) => Some(latest),
            DocumentRecord::Checkpoint(_) => None,
        })
    }

    pub fn message_line_count(&self, renderer: &dyn Renderer) -> usize {
        self.body
            .iter()
            .filter(|line| renderer.is_message_line(line))
            .count()
    }

    pub fn marker_line_count(&self, renderer: &dyn Renderer) -> usize {
        self.body
            .iter()
            .filter(|line| renderer.is_date_marker(line))
            .count()
    }
}

fn owned(slice: &[&str]) -> Vec<String> {
    slice.iter().map(|s| (*s).to_string()).collect()
}

fn invalid(reason: impl Into<String>) -> HistoryError {
    HistoryError::InvalidDocument(reason.into())
}

pub fn parse_document(text: &str, renderer: &dyn Renderer) -> Result<ParsedDocument, HistoryError> {
    let lines: Vec<&str> = text.lines().collect();
    let open = lines
        .iter()
        .position(|line| *line == renderer.body_open())
        .ok_or_else(|| invalid(format!("missing body delimiter `{}`", renderer.body_open())))?;
    let close = lines[open + 1..]
        .iter()
        .position(|line| *line == renderer.body_close())
        .map(|offset| open + 1 + offset)
        .ok_or_else(|| invalid(format!("missing body delimiter `{}`", renderer.body_close())))?;

    let mut records = Vec::new();
    let mut cursor = close + 1;
    while let Some(line) = lines.get(cursor) {
        let Some(payload) = renderer.record_payload(line) else {
            break;
        };
        let record: DocumentRecord = serde_json::from_str(&payload)
            .map_err(|err| invalid(format!("unreadable trailer record on line {}: {err}", cursor + 1)))?;
        records.push(record);
        cursor += 1;
    }

    let checkpoints = records
        .iter()
        .filter(|r| matches!(r, DocumentRecord::Checkpoint(_)))
        .count();
    if checkpoints > 1 {
        return Err(invalid(format!("{checkpoints} checkpoint records; expected at most one")));
    }

    Ok(ParsedDocument {
        format: renderer.format(),
        preamble: owned(&lines[..=open]),
        body: owned(&lines[open + 1..close]),
        records,
        closing: owned(&lines[cursor..]),
    })
}

/// Reads and parses a document, choosing the markup by file extension.
pub fn read_document(path: &Path) -> Result<(ParsedDocument, Box<dyn Renderer>)> {
    let format = OutputFormat::from_path(path).ok_or_else(|| {
        invalid(format!(
            "{} is neither an .html nor a .md chat history",
            path.display()
        ))
    })?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let renderer = renderer_for(format, DayClock::Local, None);
    let parsed = parse_document(&text, renderer.as_ref())
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok((parsed, renderer))
}

/// Writes `lines` to `path` atomically.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut staged = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to stage document in {}", dir.display()))?;
    {
        let mut out = BufWriter::new(staged.as_file_mut());
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
    }
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
