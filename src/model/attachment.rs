//! Attachment payloads carried by a parsed email.

/// One non-body MIME part of an email, fully decoded.
///
/// The declared content type comes straight from the message and is not
/// trusted for anything that matters; the bytes are sniffed instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Filename from the headers. Generated as `attachment_<n>` if missing.
    pub filename: String,

    /// Declared MIME content type (e.g. `"image/png"`).
    pub content_type: String,

    /// Content-ID without the surrounding angle brackets.
    pub content_id: Option<String>,

    /// Decoded payload.
    pub content: Vec<u8>,
}

/// Strip the angle brackets a `Content-ID` header value is usually wrapped in.
pub fn normalize_content_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);
    trimmed.to_string()
}
