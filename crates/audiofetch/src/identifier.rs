//! Video identifier extraction from remote URLs.

use std::sync::LazyLock;

use regex::Regex;

/// Length of a platform video identifier.
pub const IDENTIFIER_LEN: usize = 11;

// watch?v=, youtu.be/, embed/, v/, shorts/ and live/ shapes. The trailing
// group rejects tokens longer than eleven characters.
static RE_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#\s]*&)?v=|embed/|v/|shorts/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
    )
    .unwrap()
});

/// Extracts the 11 character video identifier from `url`.
///
/// Returns `None` for anything that does not look like a supported URL;
/// malformed input is an ordinary validation failure, not an error.
pub fn extract_identifier(url: &str) -> Option<String> {
    RE_VIDEO_ID
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns true if `candidate` has the shape of an identifier.
pub fn is_valid_identifier(candidate: &str) -> bool {
    candidate.len() == IDENTIFIER_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
