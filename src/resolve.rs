//! Rewriting image references to embedded copies.
//!
//! Every `<img>` is classified by its `src`:
//!
//! - `http://` / `https://`: looked up in the download map. The local file
//!   must sniff as an image, otherwise the element is removed.
//! - `cid:`: looked up among the email's attachments. Embedded whatever
//!   its type.
//! - anything else is logged and left alone.
//!
//! Elements whose source cannot be found locally are removed so the reader
//! never shows a broken image.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::attachments::ExtractedAttachments;
use crate::book::BookBuilder;
use crate::html::{ImageDocument, ImageElement};
use crate::model::attachment::normalize_content_id;
use crate::naming::digest_hex;
use crate::sniff::sniff_file;

/// Attributes that only make sense for a live web page.
const STRIPPED_ATTRIBUTES: [&str; 2] = ["loading", "srcset"];

/// Where an image reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Remote(&'a str),
    ContentId(&'a str),
    Unsupported,
}

/// Classify an `src` value.
pub fn classify(src: &str) -> ImageSource<'_> {
    let src = src.trim();
    let lower = src.get(..8).unwrap_or(src).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        ImageSource::Remote(src)
    } else if lower.starts_with("cid:") {
        ImageSource::ContentId(&src[4..])
    } else {
        ImageSource::Unsupported
    }
}

/// Distinct remote image URLs of a document, in document order.
///
/// URLs are compared as raw strings.
pub fn remote_urls<D: ImageDocument>(doc: &D) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for img in doc.images() {
        let Some(src) = img.attr("src") else {
            continue;
        };
        if let ImageSource::Remote(url) = classify(&src) {
            if seen.insert(url.to_string()) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

/// What happened to the images of one email.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    /// Elements now pointing at an embedded image.
    pub embedded: usize,
    /// Elements removed because no usable image was found.
    pub removed: usize,
    /// Elements left alone because their source scheme is not handled.
    pub unsupported: usize,
}

/// Rewrites image references of one email against local files.
pub struct Resolver<'a> {
    book: &'a mut dyn BookBuilder,
    downloads: &'a HashMap<String, PathBuf>,
    attachments: &'a ExtractedAttachments,
    stats: ResolveStats,
}

impl<'a> Resolver<'a> {
    pub fn new(
        book: &'a mut dyn BookBuilder,
        downloads: &'a HashMap<String, PathBuf>,
        attachments: &'a ExtractedAttachments,
    ) -> Self {
        Self {
            book,
            downloads,
            attachments,
            stats: ResolveStats::default(),
        }
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Rewrite every image element of `doc`, in document order.
    pub fn resolve_document<D: ImageDocument>(&mut self, doc: &D) {
        for img in doc.images() {
            for attr in STRIPPED_ATTRIBUTES {
                img.remove_attr(attr);
            }

            let src = img.attr("src").unwrap_or_default();
            match classify(&src) {
                ImageSource::Remote(url) => self.resolve_remote(&img, url),
                ImageSource::ContentId(cid) => self.resolve_content_id(&img, cid),
                ImageSource::Unsupported => {
                    warn!(src = %src, "Unsupported image reference");
                    self.stats.unsupported += 1;
                }
            }
        }
    }

    fn resolve_remote<E: ImageElement>(&mut self, img: &E, url: &str) {
        let downloads = self.downloads;
        let Some(local) = downloads.get(url) else {
            warn!(url = %url, "Image was not downloaded, removing");
            self.drop_element(img);
            return;
        };

        let sniffed = match sniff_file(local) {
            Ok(sniffed) => sniffed,
            Err(e) => {
                warn!(url = %url, path = %local.display(), error = %e, "Cannot read image, removing");
                self.drop_element(img);
                return;
            }
        };
        if !sniffed.is_image() {
            warn!(url = %url, mime = %sniffed.mime, "Downloaded file is not an image, removing");
            self.drop_element(img);
            return;
        }

        let mut name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !name.ends_with(&sniffed.extension) {
            name.push_str(&sniffed.extension);
        }
        self.embed(img, local, &name, url);
    }

    fn resolve_content_id<E: ImageElement>(&mut self, img: &E, raw: &str) {
        let cid = normalize_content_id(raw);
        let attachments = self.attachments;
        let Some(local) = attachments.get(&cid) else {
            warn!(cid = %cid, "No attachment for content id, removing");
            self.drop_element(img);
            return;
        };

        let extension = match sniff_file(local) {
            Ok(sniffed) => sniffed.extension,
            Err(e) => {
                debug!(cid = %cid, error = %e, "Cannot sniff attachment");
                String::new()
            }
        };
        let name = format!("attachment_{cid}{extension}");
        self.embed(img, local, &name, raw);
    }

    fn embed<E: ImageElement>(&mut self, img: &E, local: &Path, name: &str, src: &str) {
        match self.book.add_image(local, name) {
            Ok(reference) => {
                debug!(src = %src, reference = %reference, "Rewrote image");
                img.set_attr("src", &reference);
                self.stats.embedded += 1;
            }
            Err(e) => {
                warn!(src = %src, error = %e, "Cannot embed image, removing");
                self.drop_element(img);
            }
        }
    }

    fn drop_element<E: ImageElement>(&mut self, img: &E) {
        img.remove();
        self.stats.removed += 1;
    }

    /// Append every image attachment to a document that had no HTML body.
    ///
    /// Attachments reachable under two keys are embedded once. Images are
    /// named after `identity` and their position among the attachments.
    pub fn insert_attachment_images<D: ImageDocument>(&mut self, doc: &D, identity: &str) {
        let prefix = digest_hex(identity);
        let mut seen: HashSet<&Path> = HashSet::new();
        let mut index = 0;

        let attachments = self.attachments;
        for path in attachments.paths() {
            if !seen.insert(path.as_path()) {
                continue;
            }
            index += 1;

            let sniffed = match sniff_file(path) {
                Ok(sniffed) if sniffed.is_image() => sniffed,
                Ok(sniffed) => {
                    debug!(path = %path.display(), mime = %sniffed.mime, "Attachment is not an image");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read attachment");
                    continue;
                }
            };

            let name = format!("{prefix}_attachment_{index}{}", sniffed.extension);
            match self.book.add_image(path, &name) {
                Ok(reference) => {
                    doc.append_image(&reference);
                    self.stats.embedded += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot embed attachment"),
            }
        }
    }
}
