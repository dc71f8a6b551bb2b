//! Serialize an `RcDom` subtree as well-formed XHTML.
//!
//! EPUB content documents are XML, so HTML that is fine in a browser
//! (unclosed `<img>`, `xmlns:o` attributes from Outlook, stray control
//! characters) has to be normalized on the way out. Scripts and comments
//! are dropped; tags and attributes whose names are not plain XML names are
//! unwrapped or skipped.

use html5ever::Namespace;
use markup5ever_rcdom::{Handle, NodeData};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Serialize the children of `node` (not the node itself).
pub fn serialize_children(node: &Handle) -> String {
    let mut out = String::new();
    let html_ns = Namespace::from(HTML_NS);
    for child in node.children.borrow().iter() {
        write_node(&mut out, child, &html_ns);
    }
    out
}

fn write_node(out: &mut String, node: &Handle, parent_ns: &Namespace) {
    match node.data {
        NodeData::Text { ref contents } => push_escaped(out, &contents.borrow(), false),
        NodeData::Element {
            ref name,
            ref attrs,
            ..
        } => {
            let tag = &*name.local;
            if tag == "script" {
                return;
            }
            if !is_xml_name(tag) {
                // Unwrap: keep the content of e.g. <o:p>
                for child in node.children.borrow().iter() {
                    write_node(out, child, parent_ns);
                }
                return;
            }

            out.push('<');
            out.push_str(tag);
            if name.ns != *parent_ns && !name.ns.is_empty() {
                out.push_str(" xmlns=\"");
                push_escaped(out, &name.ns, true);
                out.push('"');
            }
            for attr in attrs.borrow().iter() {
                let attr_name = &*attr.name.local;
                if attr.name.prefix.is_some() || !is_xml_name(attr_name) || attr_name == "xmlns" {
                    continue;
                }
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                push_escaped(out, &attr.value, true);
                out.push('"');
            }

            let children = node.children.borrow();
            if children.is_empty() && VOID_ELEMENTS.contains(&tag) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children.iter() {
                write_node(out, child, &name.ns);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                write_node(out, child, parent_ns);
            }
        }
        NodeData::Doctype { .. }
        | NodeData::Comment { .. }
        | NodeData::ProcessingInstruction { .. } => {}
    }
}

/// Plain ASCII XML name without a namespace prefix.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Escape markup characters and drop characters XML 1.0 forbids.
pub fn push_escaped(out: &mut String, text: &str, in_attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c.is_control() => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
}

/// Escape a string for use in XHTML text or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text, true);
    out
}
