//! The conversion run: emails in, one EPUB out.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::attachments::{AttachmentExtractor, DiskExtractor};
use crate::book::{BookBuilder, EpubBook};
use crate::chapter;
use crate::config::{Config, FetchConfig};
use crate::error::{ConvertError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::html::HtmlDocument;
use crate::parser::eml::parse_eml;
use crate::resolve::{remote_urls, ResolveStats, Resolver};
use crate::sniff::sniff_file;

/// Placeholder cover used when none is configured.
const DEFAULT_COVER: &[u8] = include_bytes!("../assets/cover.png");

/// Everything a run needs to know, after config and CLI flags are merged.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub output: PathBuf,
    pub title: String,
    pub author: String,
    /// Cover image; the built-in placeholder when `None`.
    pub cover: Option<PathBuf>,
    pub images_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub fetch: FetchConfig,
}

impl ConvertOptions {
    /// Options from a loaded configuration, writing to `output`.
    pub fn from_config(config: &Config, output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            title: config.book.title.clone(),
            author: config.book.author.clone(),
            cover: config.book.cover.clone(),
            images_dir: config.paths.images_dir.clone(),
            attachments_dir: config.paths.attachments_dir.clone(),
            fetch: config.fetch.clone(),
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub chapters: usize,
    pub images: usize,
    pub failed_downloads: usize,
    pub removed_images: usize,
    pub output: PathBuf,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wrote {} chapter(s) with {} image(s) to {}",
            self.chapters,
            self.images,
            self.output.display()
        )?;
        if self.failed_downloads > 0 || self.removed_images > 0 {
            write!(
                f,
                " ({} failed download(s), {} image(s) dropped)",
                self.failed_downloads, self.removed_images
            )?;
        }
        Ok(())
    }
}

/// Converts emails into a book.
///
/// Owns the state that lives for one run: downloaded URLs are remembered so
/// that an image shared by several emails is fetched once.
pub struct Converter<F: Fetcher, A: AttachmentExtractor> {
    options: ConvertOptions,
    fetcher: F,
    extractor: A,
    downloads: HashMap<String, PathBuf>,
    failed_downloads: usize,
    removed_images: usize,
}

impl Converter<HttpFetcher, DiskExtractor> {
    /// A converter that downloads over HTTP and stores attachments on disk,
    /// in the directories named by `options`.
    pub fn new(options: ConvertOptions) -> Result<Self> {
        let fetcher = HttpFetcher::new(&options.fetch, &options.images_dir)?;
        let extractor = DiskExtractor::new(&options.attachments_dir);
        Ok(Self::with_parts(options, fetcher, extractor))
    }
}

impl<F: Fetcher, A: AttachmentExtractor> Converter<F, A> {
    pub fn with_parts(options: ConvertOptions, fetcher: F, extractor: A) -> Self {
        Self {
            options,
            fetcher,
            extractor,
            downloads: HashMap::new(),
            failed_downloads: 0,
            removed_images: 0,
        }
    }

    /// Convert `emails` in order and write the book.
    ///
    /// `progress` is called after each email with `(done, total)`.
    pub async fn run(
        &mut self,
        emails: &[PathBuf],
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> Result<Summary> {
        if emails.is_empty() {
            return Err(ConvertError::NoInput);
        }
        let output = self.options.output.clone();
        if output.exists() {
            return Err(ConvertError::OutputExists(output));
        }
        for dir in [&self.options.images_dir, &self.options.attachments_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ConvertError::io(dir, e))?;
        }

        let mut book = EpubBook::new(&self.options.title);
        book.set_author(&self.options.author);
        book.set_description(&format!(
            "Email archive generated at {} with email-to-epub",
            Local::now().format("%Y-%m-%d")
        ));
        self.add_cover(&mut book)?;

        for (i, path) in emails.iter().enumerate() {
            self.convert_email(&mut book, path, i + 1).await?;
            if let Some(report) = progress {
                report(i + 1, emails.len());
            }
        }

        book.write(&output)?;

        Ok(Summary {
            chapters: book.section_count(),
            images: book.image_count(),
            failed_downloads: self.failed_downloads,
            removed_images: self.removed_images,
            output,
        })
    }

    /// Add one email as the `index`-th section of `book`.
    pub async fn convert_email(
        &mut self,
        book: &mut dyn BookBuilder,
        path: &Path,
        index: usize,
    ) -> Result<ResolveStats> {
        let message = parse_eml(path)?;
        let identity = path.to_string_lossy().into_owned();
        let attachments = self
            .extractor
            .extract(&identity, &message.subject, &message.attachments);

        let doc = HtmlDocument::parse(&message.html);
        let stats = if message.has_html() {
            let ads = doc.remove_inoreader_ads();
            if ads > 0 {
                debug!(path = %path.display(), blocks = ads, "Removed ad blocks");
            }

            let pending: Vec<String> = remote_urls(&doc)
                .into_iter()
                .filter(|url| !self.downloads.contains_key(url))
                .collect();
            if !pending.is_empty() {
                let report = self.fetcher.fetch(&pending).await;
                self.failed_downloads += report.failed.len();
                self.downloads.extend(report.downloaded);
            }

            let mut resolver = Resolver::new(book, &self.downloads, &attachments);
            resolver.resolve_document(&doc);
            resolver.stats()
        } else {
            if let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) {
                doc.append_text_block(text);
            }
            let mut resolver = Resolver::new(book, &self.downloads, &attachments);
            resolver.insert_attachment_images(&doc, &identity);
            resolver.stats()
        };
        self.removed_images += stats.removed;

        let chapter = chapter::assemble(&message, &doc.body_xhtml(), index);
        book.add_section(&chapter.html, &chapter.title, &chapter.filename)?;

        info!(
            path = %path.display(),
            title = %chapter.title,
            embedded = stats.embedded,
            removed = stats.removed,
            unsupported = stats.unsupported,
            "Added chapter"
        );
        Ok(stats)
    }

    fn add_cover(&self, book: &mut dyn BookBuilder) -> Result<()> {
        // Keeps the placeholder on disk until the book has read it
        let mut placeholder = None;
        let cover_path = match &self.options.cover {
            Some(path) => path.clone(),
            None => {
                let file = write_placeholder_cover()?;
                let path = file.path().to_path_buf();
                placeholder = Some(file);
                path
            }
        };

        let sniffed = sniff_file(&cover_path).map_err(|e| {
            ConvertError::Cover(format!("{}: {e}", cover_path.display()))
        })?;
        if !sniffed.is_image() {
            return Err(ConvertError::Cover(format!(
                "{} is {}, not an image",
                cover_path.display(),
                sniffed.mime
            )));
        }

        let reference = book.add_image(&cover_path, &format!("epub-cover{}", sniffed.extension))?;
        book.set_cover(&reference)?;
        drop(placeholder);
        Ok(())
    }
}

fn write_placeholder_cover() -> Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("email-to-epub-cover-")
        .tempfile()
        .map_err(|e| ConvertError::io(std::env::temp_dir(), e))?;
    file.write_all(DEFAULT_COVER)
        .and_then(|()| file.flush())
        .map_err(|e| ConvertError::io(file.path(), e))?;
    Ok(file)
}
