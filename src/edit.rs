use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::markup::Span;

/// The fundamental write primitive: a verified byte-span replacement in a
/// document file.
///
/// Every high-level operation (marker patches, text patches, deletions)
/// compiles down to this. Intelligence lives in span acquisition (the
/// balanced-tag scanner), not in application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    /// Document file to edit.
    pub file: PathBuf,
    /// Byte span to replace.
    pub span: Span,
    /// Replacement text for the span.
    pub new_text: String,
    /// What we expect to find at the span before applying.
    pub expected_before: EditVerification,
}

/// Verification strategy for the before-text check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required.
    ExactMatch(String),
    /// xxh3 hash of the expected text; cheaper for large spans.
    Hash(u64),
}

/// Spans longer than this verify by hash instead of stored text.
const HASH_VERIFICATION_THRESHOLD: usize = 1024;

impl EditVerification {
    pub fn from_text(text: &str) -> Self {
        if text.len() > HASH_VERIFICATION_THRESHOLD {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{start}", start = .span.start)]
    BeforeTextMismatch {
        file: PathBuf,
        span: Span,
        found: String,
    },

    #[error("invalid byte span [{start}, {end}) in file of length {file_len}", start = .span.start, end = .span.end)]
    InvalidSpan { span: Span, file_len: usize },

    #[error("edits overlap at [{start}, {end})", start = .span.start, end = .span.end)]
    OverlappingEdits { span: Span },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Outcome of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for applied/already-applied"]
pub enum EditResult {
    Applied { file: PathBuf, bytes_changed: usize },
    /// The span already holds the new text; nothing was written.
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    /// Create an edit whose verification is derived from the expected
    /// before-text (exact match for small spans, xxh3 above 1 KiB).
    pub fn new(
        file: impl Into<PathBuf>,
        span: Span,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            file: file.into(),
            span,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Create an edit with an explicit verification strategy.
    pub fn with_verification(
        file: impl Into<PathBuf>,
        span: Span,
        new_text: impl Into<String>,
        expected_before: EditVerification,
    ) -> Self {
        Self {
            file: file.into(),
            span,
            new_text: new_text.into(),
            expected_before,
        }
    }

    /// Check this edit against current document content and return the
    /// text currently at the span.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.span.start > self.span.end
            || self.span.end > content.len()
            || !content.is_char_boundary(self.span.start)
            || !content.is_char_boundary(self.span.end)
        {
            return Err(EditError::InvalidSpan {
                span: self.span,
                file_len: content.len(),
            });
        }

        let current = self.span.slice(content);

        // Already applied counts as valid regardless of verification.
        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                span: self.span,
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to the file system atomically.
    ///
    /// Reads the document, verifies the span, splices the replacement and
    /// writes via tempfile + fsync + rename. The file's mtime is bumped
    /// afterwards so watchers (dev servers, bundlers) pick up the change.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let content = read_document(&self.file)?;
        let current = self.validate(&content)?;

        if current == self.new_text {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        let patched = crate::markup::splice(&content, self.span, &self.new_text);
        atomic_write(&self.file, patched.as_bytes())?;
        filetime::set_file_mtime(&self.file, filetime::FileTime::now())?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_changed: self.new_text.len(),
        })
    }

    /// Apply a batch of edits, grouped by file, one atomic write per file.
    ///
    /// Within a file edits are applied bottom-to-top (descending start) so
    /// earlier spans stay valid; overlapping spans are rejected before
    /// anything is written.
    pub fn apply_batch(mut edits: Vec<Edit>) -> Result<Vec<EditResult>, EditError> {
        if edits.is_empty() {
            return Ok(Vec::new());
        }

        edits.sort_by(|a, b| a.file.cmp(&b.file).then(b.span.start.cmp(&a.span.start)));

        let mut results = Vec::with_capacity(edits.len());
        let mut rest = edits.as_slice();
        while let Some(first) = rest.first() {
            let n = rest.iter().take_while(|e| e.file == first.file).count();
            let (group, remaining) = rest.split_at(n);
            results.extend(apply_file_edits(group)?);
            rest = remaining;
        }

        Ok(results)
    }
}

/// Apply edits for a single file. Assumes descending-start order.
fn apply_file_edits(edits: &[Edit]) -> Result<Vec<EditResult>, EditError> {
    let file = &edits[0].file;
    let content = read_document(file)?;

    for edit in edits {
        edit.validate(&content)?;
    }

    // Sorted descending, so the later span in the file comes first:
    // the earlier edit's end must not cross the later edit's start.
    for window in edits.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.span.end > later.span.start {
            return Err(EditError::OverlappingEdits { span: later.span });
        }
    }

    let mut patched = content;
    let mut results = Vec::with_capacity(edits.len());
    let mut changed = false;

    for edit in edits {
        if edit.span.slice(&patched) == edit.new_text {
            results.push(EditResult::AlreadyApplied { file: file.clone() });
            continue;
        }
        patched = crate::markup::splice(&patched, edit.span, &edit.new_text);
        changed = true;
        results.push(EditResult::Applied {
            file: file.clone(),
            bytes_changed: edit.new_text.len(),
        });
    }

    if changed {
        atomic_write(file, patched.as_bytes())?;
        filetime::set_file_mtime(file, filetime::FileTime::now())?;
    }

    Ok(results)
}

fn read_document(path: &Path) -> Result<String, EditError> {
    let bytes = fs::read(path)?;
    let text = std::str::from_utf8(&bytes)?;
    Ok(text.to_string())
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
/// Either the full write lands or the original document is untouched.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
