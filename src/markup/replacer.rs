use crate::markup::errors::ScanError;
use crate::markup::locator::locate;
use crate::markup::scanner::{scan, Span, TokenPair};

/// Substitute `replacement` for the text a span covers.
///
/// Pure three-part concatenation: the byte ranges outside the span are
/// preserved verbatim and in order. No re-indentation or normalization is
/// performed; the caller supplies replacement text whose formatting fits
/// the surrounding context.
///
/// The span must lie within the document on char boundaries, which every
/// span produced by [`scan`] does.
pub fn splice(document: &str, span: Span, replacement: &str) -> String {
    debug_assert!(span.end <= document.len());

    let mut out =
        String::with_capacity(document.len() - span.len() + replacement.len());
    out.push_str(&document[..span.start]);
    out.push_str(replacement);
    out.push_str(&document[span.end..]);
    out
}

/// The full in-memory pipeline: locate the anchor, scan the first
/// balanced element after it, splice the replacement over that span.
///
/// Deterministic and side-effect free; on any failure the original
/// document is left untouched and the error is returned to the caller,
/// who decides whether to abort, log, or prompt.
pub fn patch(
    document: &str,
    anchor: &str,
    pair: &TokenPair,
    replacement: &str,
) -> Result<String, ScanError> {
    let marker = locate(document, anchor)?;
    let span = scan(document, marker.end(), pair)?;
    Ok(splice(document, span, replacement))
}
