//! Lossy payload trimming.
//!
//! "Compression" here shortens long text fields of cached results; it is not
//! reversible. Trimmed entries are flagged so callers can tell.

use crate::types::ResultItem;

/// Maximum characters kept in a trimmed title or description.
pub const TRIMMED_TEXT_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

/// Estimated in-memory footprint of a payload: its JSON-serialized size.
pub(crate) fn estimate_size(payload: &[ResultItem]) -> serde_json::Result<usize> {
    serde_json::to_vec(payload).map(|bytes| bytes.len())
}

/// Shorten long titles and descriptions in place.
pub(crate) fn trim_payload(payload: &mut [ResultItem]) {
    for item in payload {
        trim_text(&mut item.title);
        trim_text(&mut item.description);
    }
}

fn trim_text(text: &mut String) {
    if text.chars().count() <= TRIMMED_TEXT_CHARS {
        return;
    }
    let keep = TRIMMED_TEXT_CHARS - ELLIPSIS.len();
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    text.truncate(cut);
    text.push_str(ELLIPSIS);
}
