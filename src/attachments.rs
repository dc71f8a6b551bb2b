//! Persisting attachments so image references can find them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::attachment::Attachment;
use crate::naming::{digest_hex, plain_extension};

/// Stores an email's attachments and indexes them for lookup.
pub trait AttachmentExtractor {
    /// Persist `attachments` and map both Content-ID and filename to the
    /// stored file.
    ///
    /// `identity` names the email source (its file name) and together with
    /// `subject` and the attachment index makes stored names unique.
    fn extract(
        &self,
        identity: &str,
        subject: &str,
        attachments: &[Attachment],
    ) -> ExtractedAttachments;
}

/// Stored attachments of one email.
#[derive(Debug, Default, Clone)]
pub struct ExtractedAttachments {
    by_key: HashMap<String, PathBuf>,
    paths: Vec<PathBuf>,
}

impl ExtractedAttachments {
    /// Local file for a Content-ID (without brackets) or a filename.
    pub fn get(&self, key: &str) -> Option<&Path> {
        self.by_key.get(key).map(PathBuf::as_path)
    }

    /// Every stored file, once each, in MIME order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn insert(&mut self, attachment: &Attachment, path: PathBuf) {
        if let Some(cid) = attachment.content_id.as_deref().filter(|c| !c.is_empty()) {
            self.by_key.insert(cid.to_string(), path.clone());
        }
        if !attachment.filename.is_empty() {
            self.by_key.insert(attachment.filename.clone(), path.clone());
        }
        self.paths.push(path);
    }
}

/// Writes attachments into a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskExtractor {
    dir: PathBuf,
}

impl DiskExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where attachment `index` of the given email is stored.
    pub fn destination(
        &self,
        identity: &str,
        subject: &str,
        index: usize,
        filename: &str,
    ) -> PathBuf {
        let digest = digest_hex(&format!("{identity}.{subject}.{index}"));
        self.dir.join(format!("{digest}{}", plain_extension(filename)))
    }
}

impl AttachmentExtractor for DiskExtractor {
    fn extract(
        &self,
        identity: &str,
        subject: &str,
        attachments: &[Attachment],
    ) -> ExtractedAttachments {
        let mut extracted = ExtractedAttachments::default();

        for (index, attachment) in attachments.iter().enumerate() {
            let path = self.destination(identity, subject, index, &attachment.filename);
            if let Err(e) = std::fs::write(&path, &attachment.content) {
                warn!(
                    filename = %attachment.filename,
                    path = %path.display(),
                    error = %e,
                    "Cannot store attachment, skipping"
                );
                continue;
            }
            debug!(
                filename = %attachment.filename,
                cid = attachment.content_id.as_deref().unwrap_or(""),
                path = %path.display(),
                "Stored attachment"
            );
            extracted.insert(attachment, path);
        }

        extracted
    }
}
