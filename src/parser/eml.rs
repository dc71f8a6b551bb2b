//! Reader for individual `.eml` files.

use std::path::Path;

use mail_parser::MessageParser;

use crate::error::{ConvertError, Result};
use crate::model::address::split_address_list;
use crate::model::mail::EmailMessage;
use crate::parser::{header, mime};

/// Read and parse a single `.eml` file.
pub fn parse_eml(path: impl AsRef<Path>) -> Result<EmailMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    parse_message(&data).ok_or_else(|| ConvertError::EmailParse(path.to_path_buf()))
}

/// Parse raw message bytes. Returns `None` if no headers can be found.
///
/// Header values are taken from the raw header block so they stay
/// undecoded; bodies and attachments come from `mail-parser`.
pub fn parse_message(data: &[u8]) -> Option<EmailMessage> {
    let header_end = find_header_end(data).unwrap_or(data.len());
    let headers = header::unfold_headers(&header::decode_header_bytes(&data[..header_end]));
    if headers.is_empty() {
        return None;
    }

    let parsed = MessageParser::default().parse(data)?;
    let content = mime::extract_content(&parsed);

    let first = |name: &str| -> String {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let list = |name: &str| split_address_list(&first(name));

    Some(EmailMessage {
        from: first("from"),
        to: list("to"),
        cc: list("cc"),
        bcc: list("bcc"),
        reply_to: list("reply-to"),
        subject: first("subject"),
        html: content.html,
        text: content.text,
        attachments: content.attachments,
        headers,
    })
}

/// Find the byte offset where headers end (position of the first blank line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end() {
        // "From: a@b.com\n" = 14 bytes, "Subject: Hi\n" = 12 bytes
        let data = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        assert_eq!(find_header_end(data), Some(25));
    }

    #[test]
    fn test_find_header_end_crlf() {
        let data = b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        assert_eq!(find_header_end(data), Some(26));
    }

    #[test]
    fn test_parse_message_keeps_raw_headers() {
        let raw = b"From: =?UTF-8?B?Sm9zw6k=?= <jose@example.com>\r\n\
To: a@b.com, \"Last, First\" <c@d.com>\r\n\
Cc: e@f.com\r\n\
Subject: =?UTF-8?B?SGVsbG8=?=\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hi</p>\r\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.from, "=?UTF-8?B?Sm9zw6k=?= <jose@example.com>");
        assert_eq!(msg.subject, "=?UTF-8?B?SGVsbG8=?=");
        assert_eq!(msg.to, vec!["a@b.com", "\"Last, First\" <c@d.com>"]);
        assert_eq!(msg.cc, vec!["e@f.com"]);
        assert!(msg.bcc.is_empty());
        assert!(msg.reply_to.is_empty());
        assert_eq!(msg.header("date"), Some("Thu, 04 Jan 2024 10:00:00 +0000"));
        assert!(msg.html.contains("<p>Hi</p>"));
    }

    #[test]
    fn test_parse_message_without_headers() {
        assert!(parse_message(b"").is_none());
        assert!(parse_message(b"no headers here\n\nbody").is_none());
    }

    #[test]
    fn test_parse_eml_missing_file() {
        let err = parse_eml("/definitely/not/here.eml").unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}
