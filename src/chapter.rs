//! Turning a resolved email body into a book section.

use crate::html::xhtml::escape;
use crate::model::mail::EmailMessage;
use crate::parser::header::decode_rfc2047;

/// A finished section, ready for [`BookBuilder::add_section`](crate::book::BookBuilder::add_section).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub filename: String,
    pub html: String,
}

/// Build the section for the `index`-th email (1-based).
///
/// `body` is the already rewritten XHTML content of the email body. The
/// header block goes in front of it.
pub fn assemble(message: &EmailMessage, body: &str, index: usize) -> Chapter {
    let subject = decode_rfc2047(&message.subject);
    let mut html = info_block(message, &subject);
    html.push_str(body);

    Chapter {
        title: format!("{index}. {subject}"),
        filename: format!("page{index}.xhtml"),
        html,
    }
}

/// The header rows shown at the top of every chapter.
fn info_block(message: &EmailMessage, subject: &str) -> String {
    let mut rows: Vec<(&str, String)> = vec![
        ("From", decode_rfc2047(&message.from)),
        ("To", decode_list(&message.to)),
    ];
    for (label, list) in [
        ("ReplyTo", &message.reply_to),
        ("Bcc", &message.bcc),
        ("Cc", &message.cc),
    ] {
        if !list.is_empty() {
            rows.push((label, decode_list(list)));
        }
    }
    rows.push(("Subject", subject.to_string()));
    if let Some(date) = message.header("date").filter(|d| !d.trim().is_empty()) {
        rows.push(("Date", decode_rfc2047(date)));
    }

    let mut block = String::from("<div style=\"padding: 8px;\">");
    for (label, value) in rows {
        block.push_str("<p style=\"color:#999; margin: 8px;\">");
        block.push_str(label);
        block.push_str(":&#160;<span style=\"color:#666; text-decoration:none;\">");
        block.push_str(&escape(&value));
        block.push_str("</span></p>");
    }
    block.push_str("</div>");
    block
}

fn decode_list(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|a| decode_rfc2047(a))
        .collect::<Vec<_>>()
        .join(", ")
}
