use crate::history::model::DayBucket;
use crate::history::render::{DocumentRecord, RenderedLine, Renderer};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for buckets released by the walker, newest day first.
pub trait BucketSink {
    fn append_bucket(&mut self, bucket: &DayBucket) -> Result<()>;
}

impl BucketSink for Vec<DayBucket> {
    fn append_bucket(&mut self, bucket: &DayBucket) -> Result<()> {
        self.push(bucket.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FinalizedDocument {
    pub path: PathBuf,
    pub message_lines: u64,
    pub marker_lines: u64,
}

/// Two-phase document writer.
///
/// Buckets are appended to a spool file in arrival order: each bucket's
/// message lines newest first, followed by its date marker. `finalize`
/// reverses the spool once, line by line, which yields markers ahead of
/// their day and every line in chronological order.
pub struct DocumentWriter {
    renderer: Box<dyn Renderer>,
    spool_path: PathBuf,
    spool: BufWriter<File>,
    message_lines: u64,
    marker_lines: u64,
}

impl DocumentWriter {
    pub fn create(spool_path: &Path, renderer: Box<dyn Renderer>) -> Result<Self> {
        if let Some(parent) = spool_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(spool_path)
            .with_context(|| format!("failed to create spool {}", spool_path.display()))?;
        Ok(Self {
            renderer,
            spool_path: spool_path.to_path_buf(),
            spool: BufWriter::new(file),
            message_lines: 0,
            marker_lines: 0,
        })
    }

    pub fn finalize(
        mut self,
        final_path: &Path,
        title: &str,
        trailer: &[DocumentRecord],
    ) -> Result<FinalizedDocument> {
        self.spool
            .flush()
            .with_context(|| format!("failed to flush {}", self.spool_path.display()))?;
        let spooled = fs::read_to_string(&self.spool_path)
            .with_context(|| format!("failed to read {}", self.spool_path.display()))?;

        let dir = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to stage document in {}", dir.display()))?;
        {
            let mut out = BufWriter::new(staged.as_file_mut());
            for line in self.renderer.preamble(title) {
                writeln!(out, "{line}")?;
            }
            for line in spooled.lines().rev() {
                writeln!(out, "{line}")?;
            }
            writeln!(out, "{}", self.renderer.body_close())?;
            for record in trailer {
                writeln!(out, "{}", self.renderer.render(&RenderedLine::Record(record)))?;
            }
            for line in self.renderer.closing() {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
        }
        staged
            .persist(final_path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to write {}", final_path.display()))?;

        drop(self.spool);
        fs::remove_file(&self.spool_path)
            .with_context(|| format!("failed to remove {}", self.spool_path.display()))?;

        Ok(FinalizedDocument {
            path: final_path.to_path_buf(),
            message_lines: self.message_lines,
            marker_lines: self.marker_lines,
        })
    }

    /// Drops the spool without producing a document.
    pub fn discard(self) -> Result<()> {
        drop(self.spool);
        fs::remove_file(&self.spool_path)
            .with_context(|| format!("failed to remove {}", self.spool_path.display()))
    }
}

impl BucketSink for DocumentWriter {
    fn append_bucket(&mut self, bucket: &DayBucket) -> Result<()> {
        for message in &bucket.messages {
            let line = self.renderer.render(&RenderedLine::Message(message));
            writeln!(self.spool, "{line}")
                .with_context(|| format!("failed to append to {}", self.spool_path.display()))?;
            self.message_lines += 1;
        }
        let marker = self
            .renderer
            .render(&RenderedLine::DateMarker(bucket.date_key));
        writeln!(self.spool, "{marker}")
            .with_context(|| format!("failed to append to {}", self.spool_path.display()))?;
        self.marker_lines += 1;
        Ok(())
    }
}
