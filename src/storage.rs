// Document storage for uploaded prediction reports
//
// Files land under <media_root>/prediction_reports/YYYY/MM/DD/ with a UUID
// prefix so two uploads with the same name never collide.

use crate::error::{Result, SipmsError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Hard cap on a single uploaded document (10 MB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const UPLOAD_DIR: &str = "prediction_reports";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Relative to the media root, always with '/' separators
    pub path: String,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    media_root: PathBuf,
    max_bytes: u64,
}

impl DocumentStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        DocumentStore {
            media_root: media_root.into(),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size gate applied before anything touches the disk.
    pub fn check_size(&self, len: u64) -> Result<()> {
        if len == 0 {
            return Err(SipmsError::invalid("document", "The submitted file is empty"));
        }
        if len > self.max_bytes {
            return Err(SipmsError::invalid(
                "document",
                format!(
                    "File size cannot exceed {}MB",
                    self.max_bytes / (1024 * 1024)
                ),
            ));
        }
        Ok(())
    }

    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<StoredDocument> {
        self.check_size(bytes.len() as u64)?;

        let clean_name = sanitize_file_name(file_name);
        let dated_dir = format!("{}/{}", UPLOAD_DIR, Utc::now().format("%Y/%m/%d"));
        let relative = format!("{}/{}-{}", dated_dir, uuid::Uuid::new_v4(), clean_name);

        fs::create_dir_all(self.media_root.join(&dated_dir))?;
        fs::write(self.media_root.join(&relative), bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);

        tracing::debug!(path = %relative, size = bytes.len(), "stored document");

        Ok(StoredDocument {
            path: relative,
            file_name: clean_name,
            size: bytes.len() as u64,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    /// Resolve a stored relative path, refusing anything that escapes the root.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || relative.is_empty() {
            None
        } else {
            Some(self.media_root.join(rel))
        }
    }

    /// Remove a stored document. Already-missing files are not an error.
    pub fn delete(&self, relative: &str) -> Result<()> {
        let Some(path) = self.resolve(relative) else {
            return Err(SipmsError::invalid("document", "Invalid document path"));
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Last path component with anything outside [A-Za-z0-9._-] replaced.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
