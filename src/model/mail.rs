//! The parsed email message handed to the conversion pipeline.

use super::attachment::Attachment;

/// A single `.eml` file after parsing.
///
/// Header values are kept exactly as they appear in the file (unfolded but
/// not decoded). Rendering runs them through
/// [`decode_rfc2047`](crate::parser::header::decode_rfc2047).
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    /// Raw `From:` value.
    pub from: String,

    /// `To:` recipients, one raw address per entry.
    pub to: Vec<String>,

    /// `Cc:` recipients.
    pub cc: Vec<String>,

    /// `Bcc:` recipients.
    pub bcc: Vec<String>,

    /// `Reply-To:` addresses.
    pub reply_to: Vec<String>,

    /// Raw `Subject:` value.
    pub subject: String,

    /// All headers in file order as `(lowercase_name, raw_value)` pairs.
    pub headers: Vec<(String, String)>,

    /// HTML body. Empty when the message has no `text/html` part.
    pub html: String,

    /// Plain-text body, if any.
    pub text: Option<String>,

    /// Attachments in MIME order.
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    /// First value of a header (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the message carries an HTML body.
    pub fn has_html(&self) -> bool {
        !self.html.trim().is_empty()
    }
}
