//! EPUB 3 writer.
//!
//! Layout of the container:
//!
//! ```text
//! mimetype                      (stored, first entry)
//! META-INF/container.xml
//! OEBPS/content.opf
//! OEBPS/nav.xhtml
//! OEBPS/toc.ncx
//! OEBPS/styles/book.css
//! OEBPS/text/cover.xhtml        (when a cover is set)
//! OEBPS/text/<section>.xhtml
//! OEBPS/images/<name>
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{BookBuilder, IMAGE_REF_PREFIX};
use crate::error::{ConvertError, Result};
use crate::html::xhtml::escape;
use crate::naming::{digest_hex, sanitize_filename_part};
use crate::sniff::sniff_bytes;

const STYLESHEET: &str = "img { max-width: 100%; height: auto; }\n";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Longest image file name kept inside the container.
const MAX_IMAGE_NAME: usize = 120;

#[derive(Debug, Clone)]
struct ImageEntry {
    name: String,
    source: PathBuf,
    media_type: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Section {
    title: String,
    filename: String,
    body: String,
}

/// An in-memory EPUB, serialized once with [`BookBuilder::write`].
#[derive(Debug, Clone)]
pub struct EpubBook {
    title: String,
    author: String,
    description: String,
    language: String,
    images: Vec<ImageEntry>,
    by_name: HashMap<String, usize>,
    cover: Option<usize>,
    sections: Vec<Section>,
}

impl Default for EpubBook {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            author: String::new(),
            description: String::new(),
            language: "en".to_string(),
            images: Vec::new(),
            by_name: HashMap::new(),
            cover: None,
            sections: Vec::new(),
        }
    }
}

impl EpubBook {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Internal names of the embedded images, in insertion order.
    #[cfg(test)]
    pub fn image_names(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.name.as_str()).collect()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Serialize the container into any seekable writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // Readers require the mimetype entry first and uncompressed
        put(&mut zip, "mimetype", stored, b"application/epub+zip")?;
        put(&mut zip, "META-INF/container.xml", deflated, CONTAINER_XML.as_bytes())?;
        put(&mut zip, "OEBPS/content.opf", deflated, self.package_document().as_bytes())?;
        put(&mut zip, "OEBPS/nav.xhtml", deflated, self.nav_document().as_bytes())?;
        put(&mut zip, "OEBPS/toc.ncx", deflated, self.ncx_document().as_bytes())?;
        put(&mut zip, "OEBPS/styles/book.css", deflated, STYLESHEET.as_bytes())?;

        if let Some(cover) = self.cover {
            let name = &self.images[cover].name;
            let body = format!(
                "<div class=\"cover\"><img src=\"{}{}\" alt=\"{}\"/></div>",
                IMAGE_REF_PREFIX,
                escape(name),
                escape(&self.title)
            );
            let page = page_document(&self.title, &body);
            put(&mut zip, "OEBPS/text/cover.xhtml", deflated, page.as_bytes())?;
        }

        for section in &self.sections {
            let page = page_document(&section.title, &section.body);
            let entry = format!("OEBPS/text/{}", section.filename);
            put(&mut zip, &entry, deflated, page.as_bytes())?;
        }

        for image in &self.images {
            // Already compressed formats gain nothing from deflate
            let options = if image.media_type == "image/svg+xml" {
                deflated
            } else {
                stored
            };
            let entry = format!("OEBPS/images/{}", image.name);
            put(&mut zip, &entry, options, &image.data)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn identifier(&self) -> String {
        let mut seed = self.title.clone();
        for section in &self.sections {
            seed.push('\n');
            seed.push_str(&section.title);
        }
        format!("urn:email-to-epub:{}", digest_hex(&seed))
    }

    fn package_document(&self) -> String {
        let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let mut manifest = String::new();
        let mut spine = String::new();

        manifest.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
        manifest.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
        manifest.push_str("    <item id=\"css\" href=\"styles/book.css\" media-type=\"text/css\"/>\n");

        if self.cover.is_some() {
            manifest.push_str(
                "    <item id=\"cover-page\" href=\"text/cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
            spine.push_str("    <itemref idref=\"cover-page\" linear=\"no\"/>\n");
        }
        for (i, section) in self.sections.iter().enumerate() {
            let _ = writeln!(
                manifest,
                "    <item id=\"section{}\" href=\"text/{}\" media-type=\"application/xhtml+xml\"/>",
                i + 1,
                escape(&section.filename)
            );
            let _ = writeln!(spine, "    <itemref idref=\"section{}\"/>", i + 1);
        }
        for (i, image) in self.images.iter().enumerate() {
            let properties = if self.cover == Some(i) {
                " properties=\"cover-image\""
            } else {
                ""
            };
            let _ = writeln!(
                manifest,
                "    <item id=\"image{}\" href=\"images/{}\" media-type=\"{}\"{}/>",
                i + 1,
                escape(&image.name),
                escape(&image.media_type),
                properties
            );
        }

        let cover_meta = self
            .cover
            .map(|i| format!("    <meta name=\"cover\" content=\"image{}\"/>\n", i + 1))
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:description>{description}</dc:description>
    <dc:language>{language}</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
{cover_meta}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
            identifier = escape(&self.identifier()),
            title = escape(&self.title),
            author = escape(&self.author),
            description = escape(&self.description),
            language = escape(&self.language),
        )
    }

    fn nav_document(&self) -> String {
        let mut items = String::new();
        for section in &self.sections {
            let _ = writeln!(
                items,
                "      <li><a href=\"text/{}\">{}</a></li>",
                escape(&section.filename),
                escape(&section.title)
            );
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
            title = escape(&self.title),
        )
    }

    fn ncx_document(&self) -> String {
        let mut points = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            let _ = write!(
                points,
                r#"    <navPoint id="navpoint{n}" playOrder="{n}">
      <navLabel><text>{title}</text></navLabel>
      <content src="text/{href}"/>
    </navPoint>
"#,
                n = i + 1,
                title = escape(&section.title),
                href = escape(&section.filename),
            );
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{identifier}"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
            identifier = escape(&self.identifier()),
            title = escape(&self.title),
        )
    }

    /// Pick a free internal name for `source`, or find the one it is already
    /// embedded under.
    fn claim_name(&self, name: &str, source: &Path) -> Claim {
        let (stem, extension) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name, ""),
        };
        let mut candidate = name.to_string();
        let mut counter = 1;
        while let Some(&existing) = self.by_name.get(&candidate) {
            if self.images[existing].source == source {
                return Claim::Existing(candidate);
            }
            counter += 1;
            candidate = format!("{stem}-{counter}{extension}");
        }
        Claim::Free(candidate)
    }
}

enum Claim {
    Free(String),
    Existing(String),
}

impl BookBuilder for EpubBook {
    fn set_author(&mut self, author: &str) {
        self.author = author.to_string();
    }

    fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    fn add_image(&mut self, source: &Path, name: &str) -> Result<String> {
        let name = sanitize_filename_part(name, MAX_IMAGE_NAME);
        let name = match self.claim_name(&name, source) {
            Claim::Free(free) => free,
            Claim::Existing(existing) => {
                debug!(name = %existing, "Image already embedded");
                return Ok(format!("{IMAGE_REF_PREFIX}{existing}"));
            }
        };

        let data = std::fs::read(source).map_err(|e| ConvertError::io(source, e))?;
        let media_type = sniff_bytes(&data).mime;
        debug!(name = %name, media_type = %media_type, source = %source.display(), "Embedding image");

        self.by_name.insert(name.clone(), self.images.len());
        self.images.push(ImageEntry {
            name: name.clone(),
            source: source.to_path_buf(),
            media_type,
            data,
        });
        Ok(format!("{IMAGE_REF_PREFIX}{name}"))
    }

    fn set_cover(&mut self, image_ref: &str) -> Result<()> {
        let name = image_ref.strip_prefix(IMAGE_REF_PREFIX).unwrap_or(image_ref);
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| ConvertError::Cover(format!("unknown image {image_ref}")))?;
        self.cover = Some(index);
        Ok(())
    }

    fn add_section(&mut self, html: &str, title: &str, filename: &str) -> Result<()> {
        let valid = !filename.is_empty()
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ConvertError::Book(format!("invalid section filename {filename:?}")));
        }
        if self.sections.iter().any(|s| s.filename == filename) {
            return Err(ConvertError::Book(format!("duplicate section {filename}")));
        }
        self.sections.push(Section {
            title: title.to_string(),
            filename: filename.to_string(),
            body: html.to_string(),
        });
        Ok(())
    }

    fn write(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(ConvertError::OutputExists(path.to_path_buf()));
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".email-to-epub-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ConvertError::io(dir, e))?;
        self.write_to(temp.as_file())?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ConvertError::io(temp.path(), e))?;

        temp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                ConvertError::OutputExists(path.to_path_buf())
            } else {
                ConvertError::io(path, e.error)
            }
        })?;

        info!(
            path = %path.display(),
            sections = self.sections.len(),
            images = self.images.len(),
            "Wrote EPUB"
        );
        Ok(())
    }
}

fn put<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    options: SimpleFileOptions,
    data: &[u8],
) -> Result<()> {
    zip.start_file(name, options)?;
    zip.write_all(data).map_err(ZipError::Io)?;
    Ok(())
}

fn page_document(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="../styles/book.css"/>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}
