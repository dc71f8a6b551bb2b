//! Accumulating chapters and images into an e-book.

pub mod epub;

use std::path::Path;

use crate::error::Result;

pub use epub::EpubBook;

/// Directory, relative to a section page, that image references point into.
pub const IMAGE_REF_PREFIX: &str = "../images/";

/// Everything the conversion pipeline needs from an e-book writer.
///
/// Images are registered before the section that uses them; the returned
/// reference is what goes into the section's `src` attributes.
pub trait BookBuilder {
    fn set_author(&mut self, author: &str);

    fn set_description(&mut self, description: &str);

    /// Embed the file at `source` under `name` and return its internal
    /// reference.
    ///
    /// Registering the same `name` for the same `source` twice returns the
    /// first reference. A `name` already used by another source gets a
    /// numbered suffix instead of replacing it.
    fn add_image(&mut self, source: &Path, name: &str) -> Result<String>;

    /// Use an already added image (by reference) as the cover.
    fn set_cover(&mut self, image_ref: &str) -> Result<()>;

    /// Append a section. `html` is the XHTML content of the page body.
    fn add_section(&mut self, html: &str, title: &str, filename: &str) -> Result<()>;

    /// Serialize the book to `path`, which must not exist yet.
    fn write(&self, path: &Path) -> Result<()>;
}
