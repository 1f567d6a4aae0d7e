use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("marker {anchor:?} not found in document")]
    MarkerNotFound {
        anchor: String,
        /// Closest document line by edit distance, for diagnostics.
        suggestion: Option<String>,
    },

    #[error("no tag start found after offset {from}")]
    NoTagAfterMarker { from: usize },

    #[error("expected opening token {expected:?} at offset {offset}, found {found:?}")]
    UnexpectedToken {
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("document ended at depth {depth} before nesting closed")]
    UnbalancedStructure { depth: i32 },
}
