//! MIME part extraction on top of `mail-parser`.

use mail_parser::{MessagePart, MimeHeaders, PartType};

use crate::model::attachment::{normalize_content_id, Attachment};

/// Bodies and attachments pulled out of a parsed message.
pub struct MimeContent {
    pub html: String,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Extract the HTML body, text body and attachments of a parsed message.
///
/// Only a genuine `text/html` part counts as HTML: `mail-parser` converts
/// text-only messages to HTML on request, which would hide the fact that
/// the email has no HTML body at all.
pub fn extract_content(msg: &mail_parser::Message<'_>) -> MimeContent {
    let html = msg
        .html_part(0)
        .and_then(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let text = msg.text_part(0).and_then(|part| match &part.body {
        PartType::Text(text) => Some(text.to_string()),
        _ => None,
    });

    let attachments = msg
        .attachments()
        .enumerate()
        .map(|(idx, part)| attachment_from_part(idx, part))
        .collect();

    MimeContent {
        html,
        text,
        attachments,
    }
}

fn attachment_from_part(idx: usize, part: &MessagePart<'_>) -> Attachment {
    let filename = part
        .attachment_name()
        .map(String::from)
        .unwrap_or_else(|| format!("attachment_{idx}"));

    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let content_id = part
        .content_id()
        .map(normalize_content_id)
        .filter(|cid| !cid.is_empty());

    Attachment {
        filename,
        content_type,
        content_id,
        content: part.contents().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::MessageParser;

    const RELATED: &str = "From: a@b.com\r\n\
Subject: pics\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p><img src=\"cid:img1\"></p>\r\n\
--XX\r\n\
Content-Type: image/png; name=\"dot.png\"\r\n\
Content-ID: <img1>\r\n\
Content-Disposition: inline; filename=\"dot.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--XX--\r\n";

    #[test]
    fn test_extract_html_and_inline_attachment() {
        let msg = MessageParser::default().parse(RELATED.as_bytes()).unwrap();
        let content = extract_content(&msg);
        assert!(content.html.contains("cid:img1"));
        assert_eq!(content.attachments.len(), 1);
        let att = &content.attachments[0];
        assert_eq!(att.filename, "dot.png");
        assert_eq!(att.content_type, "image/png");
        assert_eq!(att.content_id.as_deref(), Some("img1"));
        assert_eq!(att.content, b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_text_only_message_has_no_html() {
        let raw = b"From: a@b.com\r\nSubject: hi\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        let msg = MessageParser::default().parse(&raw[..]).unwrap();
        let content = extract_content(&msg);
        assert!(content.html.is_empty());
        assert!(content.text.unwrap_or_default().contains("Just text"));
        assert!(content.attachments.is_empty());
    }
}
