//! Content-type sniffing from magic bytes.
//!
//! Declared content types (HTTP headers, MIME part headers) are not trusted;
//! anything embedded into the book is identified by its bytes.

use std::io::Read;
use std::path::Path;

/// How many leading bytes are inspected.
const SNIFF_LEN: usize = 8192;

/// A sniffed content type and its canonical extension (with the dot, or `""`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: String,
    pub extension: String,
}

impl Sniffed {
    fn new(mime: &str, extension: &str) -> Self {
        Self {
            mime: mime.to_string(),
            extension: extension.to_string(),
        }
    }

    /// Whether the content belongs to the `image/*` family.
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Sniff the content type of a file on disk.
pub fn sniff_file(path: &Path) -> std::io::Result<Sniffed> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut buffer)?;
    Ok(sniff_bytes(&buffer))
}

/// Sniff the content type of an in-memory buffer.
///
/// SVG is recognised by its root element; everything else goes through the
/// `infer` crate's magic byte detection, then HTML and plain-text heuristics.
pub fn sniff_bytes(buffer: &[u8]) -> Sniffed {
    let head = String::from_utf8_lossy(&buffer[..buffer.len().min(1024)]).to_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();

    // Checked first: infer reports SVG documents as generic XML
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Sniffed::new("image/svg+xml", ".svg");
    }

    if let Some(kind) = infer::get(buffer) {
        return Sniffed {
            mime: kind.mime_type().to_string(),
            extension: format!(".{}", kind.extension()),
        };
    }

    if looks_like_html(head) {
        return Sniffed::new("text/html", ".html");
    }
    if !buffer.is_empty() && is_likely_text(buffer) {
        return Sniffed::new("text/plain", ".txt");
    }
    Sniffed::new("application/octet-stream", "")
}

fn looks_like_html(head: &str) -> bool {
    const MARKERS: [&str; 8] = [
        "<!doctype html",
        "<html",
        "<head",
        "<body",
        "<script",
        "<title",
        "<div",
        "<p>",
    ];
    MARKERS.iter().any(|m| head.starts_with(m))
}

/// Printable UTF-8 with no NUL bytes.
fn is_likely_text(buffer: &[u8]) -> bool {
    if buffer.contains(&0) {
        return false;
    }
    match std::str::from_utf8(buffer) {
        Ok(s) => s.chars().all(|c| !c.is_control() || c.is_whitespace()),
        // The sniff window may cut a multi-byte character in half
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > buffer.len(),
    }
}
