//! Deterministic names for cached files and embedded book resources.

use sha2::{Digest, Sha256};

/// Hex digest used for cache file names.
///
/// Truncated to 128 bits: the names only need to be collision-free across
/// one archive, and shorter names keep the EPUB manifest readable.
pub fn digest_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = format!("{digest:x}");
    hex[..32].to_string()
}

/// Replace characters that are unsafe in file names and EPUB hrefs with `_`.
///
/// Keeps ASCII alphanumerics plus `-`, `.` and `_`, and caps the length.
/// Long names lose characters from the stem; a plain extension is kept.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        return "unknown".to_string();
    }
    if sanitized.len() <= max_len {
        return sanitized.to_string();
    }

    // Only ASCII is left, so byte offsets are char boundaries
    let extension = plain_extension(sanitized);
    if extension.len() < max_len {
        let stem = &sanitized[..sanitized.len() - extension.len()];
        format!("{}{}", &stem[..max_len - extension.len()], extension)
    } else {
        sanitized[..max_len].to_string()
    }
}

/// Extension of a path-like string including the dot, if it is short and plain.
pub fn plain_extension(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
