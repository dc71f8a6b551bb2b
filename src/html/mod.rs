//! HTML document access for the image resolver.
//!
//! The resolver only needs a handful of operations on a document, captured
//! by [`ImageDocument`] and [`ImageElement`]. [`HtmlDocument`] implements
//! them on top of `html5ever`.

pub mod dom;
pub mod xhtml;

pub use dom::{HtmlDocument, HtmlImage};

/// One `<img>` element of a document.
pub trait ImageElement {
    /// Value of an attribute, if present.
    fn attr(&self, name: &str) -> Option<String>;

    /// Set (or add) an attribute.
    fn set_attr(&self, name: &str, value: &str);

    /// Remove an attribute if present.
    fn remove_attr(&self, name: &str);

    /// Detach the element from the document.
    fn remove(&self);
}

/// A parsed document whose images can be enumerated and extended.
pub trait ImageDocument {
    type Element: ImageElement;

    /// All `<img>` elements in document order.
    fn images(&self) -> Vec<Self::Element>;

    /// Append `<img src="...">` at the end of the body.
    fn append_image(&self, src: &str);
}
