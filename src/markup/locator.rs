use crate::markup::errors::ScanError;

/// Result of locating an anchor marker in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch {
    /// Byte offset of the first occurrence.
    pub byte_start: usize,
    /// One past the last byte of the occurrence.
    pub byte_end: usize,
}

impl MarkerMatch {
    /// The offset scanning should continue from.
    pub fn end(&self) -> usize {
        self.byte_end
    }
}

/// Locate the first occurrence of `anchor` in `document`.
///
/// Exact, case-sensitive substring search. An empty anchor matches at
/// offset zero, which lets callers drive a scan from the start of the
/// document.
///
/// On failure the error carries the document line closest to the anchor
/// by normalized edit distance, so callers can surface a "did you mean"
/// diagnostic for markers that drifted (reindented, reworded comments).
pub fn locate(document: &str, anchor: &str) -> Result<MarkerMatch, ScanError> {
    match document.find(anchor) {
        Some(byte_start) => Ok(MarkerMatch {
            byte_start,
            byte_end: byte_start + anchor.len(),
        }),
        None => Err(ScanError::MarkerNotFound {
            anchor: anchor.to_string(),
            suggestion: closest_line(document, anchor),
        }),
    }
}

/// Similarity floor below which a suggestion is noise, not help.
const SUGGESTION_THRESHOLD: f64 = 0.5;

fn closest_line(document: &str, anchor: &str) -> Option<String> {
    if anchor.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &str)> = None;
    for line in document.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let score = strsim::normalized_levenshtein(trimmed, anchor.trim());
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, trimmed));
        }
    }

    best.and_then(|(score, line)| (score >= SUGGESTION_THRESHOLD).then(|| line.to_string()))
}
