//! HTML page files

use anyhow::{Context, Result};
use inventory_sync_core::{parse_html, to_html, Document, PageContext, PassSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub fn load_document(path: &Path) -> Result<Document> {
    let html = fs::read_to_string(path)
        .with_context(|| format!("Failed to read page: {:?}", path))?;
    Ok(parse_html(&html))
}

pub fn write_document(path: &Path, doc: &Document) -> Result<()> {
    fs::write(path, to_html(doc)).with_context(|| format!("Failed to write page: {:?}", path))
}

/// A page read from one file and written (annotated) to another, or the same
pub struct PageFile {
    input: PathBuf,
    output: PathBuf,
    doc: Document,
    seen: Option<SystemTime>,
}

impl PageFile {
    pub fn open(input: &Path, output: Option<&Path>) -> Result<Self> {
        let doc = load_document(input)?;
        Ok(Self {
            input: input.to_path_buf(),
            output: output.unwrap_or(input).to_path_buf(),
            doc,
            seen: modified(input),
        })
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Re-read the input if it changed on disk since the last look
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        let current = modified(&self.input);
        if current == self.seen {
            return Ok(false);
        }
        self.doc = load_document(&self.input)?;
        self.seen = current;
        log::debug!("Page {:?} changed on disk", self.input);
        Ok(true)
    }

    pub fn save(&mut self) -> Result<()> {
        write_document(&self.output, &self.doc)?;
        if self.output == self.input {
            // Our own write is not an external change
            self.seen = modified(&self.input);
        }
        Ok(())
    }

    /// Run `pass` against the document and save when anything changed
    pub fn apply<F>(&mut self, ctx: &mut PageContext, pass: F) -> Result<PassSummary>
    where
        F: FnOnce(&mut PageContext, &mut Document) -> PassSummary,
    {
        let summary = pass(ctx, &mut self.doc);
        if !summary.changes.is_empty() {
            self.save()?;
            log::info!(
                "Annotated {:?}: {} of {} items sold",
                self.output,
                summary.sold,
                summary.items
            );
        }
        Ok(summary)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
