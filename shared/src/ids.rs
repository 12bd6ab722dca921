//! Helpers for turning author-entered identifiers into script labels and
//! filesystem path components.

/// Returns true if an id is safe to use as a single path component on all platforms.
///
/// Rules:
/// - Must be non-empty and not "." or ".."
/// - Must not contain path separators ('/' or '\\')
/// - Must not contain control characters or NUL
/// - Must not contain Windows-reserved filename characters
/// - Must not end with '.' or space (Windows restriction)
pub fn is_safe_path_component(id: &str) -> bool {
    if id.is_empty() || id == "." || id == ".." {
        return false;
    }

    if id.ends_with('.') || id.ends_with(' ') {
        return false;
    }

    for c in id.chars() {
        if c == '/' || c == '\\' || c == '\0' {
            return false;
        }
        if c.is_control() {
            return false;
        }
        // Windows-reserved filename characters.
        if matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            return false;
        }
    }

    true
}

/// Slugify an identifier for use as a script label or directory name.
///
/// Converts ids like "  Alice's Route!  " to "alice_s_route". Only ASCII
/// alphanumerics survive; everything else collapses into single underscores.
/// Returns an empty string when nothing usable is left.
pub fn slugify(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut prev_was_underscore = false;

    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            prev_was_underscore = false;
        } else if !prev_was_underscore {
            result.push('_');
            prev_was_underscore = true;
        }
    }

    result.trim_matches('_').to_string()
}
