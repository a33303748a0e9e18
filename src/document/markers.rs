use std::sync::LazyLock;

use regex::Regex;

/// A whole line such as `===FULL_DOCUMENT===` or `=== EXPANSION ===`.
static MARKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*={3,}[ \t]*[A-Z][A-Z0-9_]*(?:[ \t]+[A-Z0-9_]+)*[ \t]*=+[ \t]*(?:\r?\n|$)")
        .expect("marker pattern is valid")
});

/// Removes structural marker lines, leaving all other text untouched.
pub fn strip_markers(text: &str) -> String {
    MARKER_LINE.replace_all(text, "").into_owned()
}

/// What a reader sees: markers removed, outer whitespace trimmed. Used for
/// both the streaming preview and the final document so the two agree.
pub fn clean_document(text: &str) -> String {
    strip_markers(text).trim().to_string()
}
