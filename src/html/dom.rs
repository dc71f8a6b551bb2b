//! [`ImageDocument`] over an `html5ever` `RcDom`.

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::{xhtml, ImageDocument, ImageElement};

/// Text that marks the sponsored blocks Inoreader injects into forwarded articles.
const INOREADER_ADS: &str = "ads from inoreader";

/// A parsed HTML email body.
pub struct HtmlDocument {
    dom: RcDom,
}

/// Handle to an `<img>` element inside an [`HtmlDocument`].
#[derive(Clone)]
pub struct HtmlImage(Handle);

impl HtmlDocument {
    /// Parse an HTML string. Never fails: the HTML5 algorithm recovers from
    /// any input and always produces `<html>`, `<head>` and `<body>`.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        Self { dom }
    }

    /// The `<body>` element.
    fn body(&self) -> Option<Handle> {
        find_elements(&self.dom.document, "body").into_iter().next()
    }

    /// Body content as well-formed XHTML (without the `<body>` tag itself).
    pub fn body_xhtml(&self) -> String {
        self.body()
            .map(|body| xhtml::serialize_children(&body))
            .unwrap_or_default()
    }

    /// Append a `<div>` holding preformatted plain text at the end of the body.
    pub fn append_text_block(&self, text: &str) {
        let Some(body) = self.body() else {
            return;
        };
        let div = new_element(&body, "div", &[("style", "white-space: pre-wrap;")]);
        let text = Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from(text)),
        });
        append_child(&div, text);
        append_child(&body, div);
    }

    /// Remove the `<center>` blocks that wrap Inoreader advertisements.
    ///
    /// Returns the number of blocks removed.
    pub fn remove_inoreader_ads(&self) -> usize {
        let mut removed: Vec<Handle> = Vec::new();
        for div in find_elements(&self.dom.document, "div") {
            if !text_content(&div).contains(INOREADER_ADS) {
                continue;
            }
            if let Some(center) = closest(&div, "center") {
                if !removed.iter().any(|r| Rc::ptr_eq(r, &center)) {
                    detach(&center);
                    removed.push(center);
                }
            }
        }
        removed.len()
    }
}

impl ImageDocument for HtmlDocument {
    type Element = HtmlImage;

    fn images(&self) -> Vec<HtmlImage> {
        find_elements(&self.dom.document, "img")
            .into_iter()
            .map(HtmlImage)
            .collect()
    }

    fn append_image(&self, src: &str) {
        if let Some(body) = self.body() {
            let img = new_element(&body, "img", &[("src", src)]);
            append_child(&body, img);
        }
    }
}

impl ImageElement for HtmlImage {
    fn attr(&self, name: &str) -> Option<String> {
        let NodeData::Element { ref attrs, .. } = self.0.data else {
            return None;
        };
        let attrs = attrs.borrow();
        attrs
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string())
    }

    fn set_attr(&self, name: &str, value: &str) {
        let NodeData::Element { ref attrs, .. } = self.0.data else {
            return;
        };
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(attr) => attr.value = StrTendril::from(value),
            None => attrs.push(attribute(name, value)),
        }
    }

    fn remove_attr(&self, name: &str) {
        if let NodeData::Element { ref attrs, .. } = self.0.data {
            attrs.borrow_mut().retain(|a| &*a.name.local != name);
        }
    }

    fn remove(&self) {
        detach(&self.0);
    }
}

// ── Tree helpers ────────────────────────────────────────────────

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

/// Create an element in the same namespace as `sibling_of`.
fn new_element(sibling_of: &Handle, tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let ns = match sibling_of.data {
        NodeData::Element { ref name, .. } => name.ns.clone(),
        _ => Namespace::from("http://www.w3.org/1999/xhtml"),
    };
    Node::new(NodeData::Element {
        name: QualName::new(None, ns, LocalName::from(tag)),
        attrs: RefCell::new(attrs.iter().map(|(k, v)| attribute(k, v)).collect()),
        template_contents: Default::default(),
        mathml_annotation_xml_integration_point: false,
    })
}

fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

fn is_element(node: &Handle, tag: &str) -> bool {
    matches!(node.data, NodeData::Element { ref name, .. } if &*name.local == tag)
}

/// All descendants of `root` with the given tag name, in document order.
fn find_elements(root: &Handle, tag: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if is_element(&node, tag) {
            found.push(node.clone());
        }
        // Reversed so the leftmost child is visited first
        for child in node.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
    }
    found
}

/// Nearest ancestor-or-self with the given tag name.
fn closest(node: &Handle, tag: &str) -> Option<Handle> {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if is_element(&n, tag) {
            return Some(n);
        }
        current = parent_of(&n);
    }
    None
}

fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    let mut stack = vec![node.clone()];
    while let Some(n) = stack.pop() {
        if let NodeData::Text { ref contents } = n.data {
            out.push_str(&contents.borrow());
        }
        for child in n.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
    }
    out
}
