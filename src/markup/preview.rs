/// Return a bounded window of `document` starting at `offset`.
///
/// Read-only inspection aid for checking where a marker or scan landed
/// before committing a patch; the automatic pipeline never calls this.
/// Both ends are clamped to the document and snapped backwards to char
/// boundaries, so any offset is safe.
pub fn preview(document: &str, offset: usize, window: usize) -> &str {
    let start = floor_boundary(document, offset.min(document.len()));
    let end = floor_boundary(document, offset.saturating_add(window).min(document.len()));
    &document[start..end]
}

fn floor_boundary(document: &str, mut idx: usize) -> usize {
    while idx > 0 && !document.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_within_document() {
        assert_eq!(preview("hello world", 6, 5), "world");
    }

    #[test]
    fn window_clamped_to_end() {
        assert_eq!(preview("hello", 3, 500), "lo");
    }

    #[test]
    fn offset_past_end_is_empty() {
        assert_eq!(preview("hello", 99, 10), "");
    }

    #[test]
    fn zero_window_is_empty() {
        assert_eq!(preview("hello", 2, 0), "");
    }

    #[test]
    fn boundaries_snap_inside_multibyte_chars() {
        let doc = "a…b";
        // Offset 2 lands inside the ellipsis; snapping must not panic.
        let w = preview(doc, 2, 10);
        assert!(doc.ends_with(w));
    }
}
