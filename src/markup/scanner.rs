use crate::markup::errors::ScanError;

/// A half-open byte range `[start, end)` into a document.
///
/// Spans produced by [`scan`] always cover an exactly balanced region:
/// equal counts of opening and closing token occurrences, with `end`
/// positioned one past the tag-end sentinel of the closing token that
/// returned nesting depth to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// The text the span covers.
    pub fn slice<'a>(&self, document: &'a str) -> &'a str {
        &document[self.start..self.end]
    }
}

/// The literal token prefixes the scanner balances, plus the sentinel
/// characters that begin and terminate a tag-like token.
///
/// The prefixes are matched literally: `<div` counts `<div>`, `<div className=...>`
/// and even `<divider>` as structural events. Callers supply the pair that
/// matches the construct kind of the region they are patching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Opening-token lead-in, e.g. `<div`.
    pub open: String,
    /// Closing-token lead-in, e.g. `</div`.
    pub close: String,
    tag_start: char,
    tag_end: char,
}

impl TokenPair {
    /// Build a pair from raw prefixes. The tag-start sentinel defaults to
    /// the first character of `open` and the tag-end sentinel to `>`.
    ///
    /// Both prefixes must be non-empty and distinct; patch-file loading
    /// enforces this, and [`scan`] reports degenerate pairs as scan
    /// failures rather than panicking.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        let open = open.into();
        let tag_start = open.chars().next().unwrap_or('<');
        Self {
            open,
            close: close.into(),
            tag_start,
            tag_end: '>',
        }
    }

    /// Angle-bracket pair for an element name: `element("div")` balances
    /// `<div` against `</div`.
    pub fn element(name: &str) -> Self {
        Self::new(format!("<{name}"), format!("</{name}"))
    }

    /// Override the sentinel characters, for tag-like syntaxes that do
    /// not use angle brackets (e.g. `[quote]`/`[/quote]`).
    pub fn with_sentinels(mut self, tag_start: char, tag_end: char) -> Self {
        self.tag_start = tag_start;
        self.tag_end = tag_end;
        self
    }

    pub fn tag_start(&self) -> char {
        self.tag_start
    }

    pub fn tag_end(&self) -> char {
        self.tag_end
    }
}

/// Scan forward from `from` for the first balanced nested element.
///
/// The cursor first advances to the nearest tag-start sentinel, which must
/// begin a token matching `pair.open`. From there a single forward pass
/// counts every literal occurrence of `pair.open` (+1) and `pair.close`
/// (-1); when depth returns to zero immediately after a closing match, the
/// closing token runs to the next tag-end sentinel and the span ends one
/// past it.
///
/// The count is name-agnostic: any occurrence of the two literal prefixes
/// moves depth, not just same-named constructs. This is only correct when
/// the scanned region nests a single construct kind: unrelated elements
/// (`<span>` inside a `<div>` region) contribute nothing, but a
/// different-named element sharing the prefix shape would be miscounted.
///
/// # Errors
///
/// - [`ScanError::NoTagAfterMarker`] if no tag-start sentinel exists at or
///   after `from` (including `from` past the end of the document).
/// - [`ScanError::UnexpectedToken`] if the token at the cursor is not
///   `pair.open`.
/// - [`ScanError::UnbalancedStructure`] if the document ends before depth
///   returns to zero, or before the final closing token's tag-end
///   sentinel appears.
pub fn scan(document: &str, from: usize, pair: &TokenPair) -> Result<Span, ScanError> {
    // Step 1: advance to the first tag-start sentinel.
    let tail = document
        .get(from..)
        .ok_or(ScanError::NoTagAfterMarker { from })?;
    let cursor = tail
        .find(pair.tag_start)
        .map(|i| from + i)
        .ok_or(ScanError::NoTagAfterMarker { from })?;

    // Step 2: the token at the cursor must be the expected opening prefix.
    if pair.open.is_empty() || !document[cursor..].starts_with(&pair.open) {
        let found: String = document[cursor..].chars().take(12).collect();
        return Err(ScanError::UnexpectedToken {
            offset: cursor,
            expected: pair.open.clone(),
            found,
        });
    }

    // Step 3: forward pass with depth counting. Opening matches win over
    // closing matches at the same position, so a closing prefix that
    // happens to contain the opening one cannot double-count.
    let mut depth: i32 = 0;
    let mut started = false;

    for (i, _) in document[cursor..].char_indices() {
        let rest = &document[cursor + i..];
        if rest.starts_with(&pair.open) {
            depth += 1;
            started = true;
        } else if !pair.close.is_empty() && rest.starts_with(&pair.close) {
            depth -= 1;
            if started && depth == 0 {
                // The full closing token extends to the next tag-end
                // sentinel (tolerates `</div >`).
                let close_end = cursor + i + pair.close.len();
                let term = document[close_end..]
                    .find(pair.tag_end)
                    .ok_or(ScanError::UnbalancedStructure { depth })?;
                let end = close_end + term + pair.tag_end.len_utf8();
                return Ok(Span::new(cursor, end));
            }
        }
    }

    Err(ScanError::UnbalancedStructure { depth })
}
