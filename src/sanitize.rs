//! Filename sanitization for uploads, renames and new directories.

/// Maximum length of a sanitized name, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

const DISALLOWED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a user-supplied filename.
///
/// Keeps only the final path segment, replaces `< > : " / \ | ? *` with `_`,
/// drops control characters, and trims leading/trailing dots and spaces.
/// Reserved device names get a `file_` prefix. Returns `None` when the result
/// is empty or, prefix included, longer than [`MAX_FILENAME_LEN`] characters.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let replaced: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if DISALLOWED.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return None;
    }

    let sanitized = if is_reserved_name(trimmed) {
        format!("file_{trimmed}")
    } else {
        trimmed.to_string()
    };

    // The limit applies to the final name, prefix included.
    if sanitized.chars().count() > MAX_FILENAME_LEN {
        return None;
    }

    Some(sanitized)
}

/// Check the stem (everything before the last dot) against the reserved device names.
fn is_reserved_name(name: &str) -> bool {
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

/// Split a name into stem and extension (extension keeps its leading dot).
///
/// A leading dot does not start an extension, so `.env` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
