//! Local filesystem blob store for photo uploads
//!
//! Files land under `<media_root>/chantiers/photos/YYYY/MM/DD/<uuid>.<ext>`;
//! the database keeps only the path relative to `media_root`, which is also
//! the URL suffix under `/media/`.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Extensions accepted for photo uploads
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Photo blob store rooted at the configured media directory
#[derive(Debug, Clone)]
pub struct PhotoStore {
    media_root: PathBuf,
    max_bytes: usize,
}

impl PhotoStore {
    pub fn new(media_root: PathBuf, max_bytes: usize) -> Self {
        Self {
            media_root,
            max_bytes,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check name, size and content of an upload; returns the normalized extension
    pub fn check(&self, file_name: &str, bytes: &[u8]) -> ApiResult<&'static str> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let Some(extension) = ALLOWED_EXTENSIONS.iter().copied().find(|e| *e == extension) else {
            return Err(ApiError::field(
                "image",
                format!("Unsupported file extension; allowed: {}.", ALLOWED_EXTENSIONS.join(", ")),
            ));
        };

        if bytes.is_empty() {
            return Err(ApiError::field("image", "The submitted file is empty."));
        }

        if bytes.len() > self.max_bytes {
            return Err(ApiError::field(
                "image",
                format!("Image exceeds {}.", format_size(self.max_bytes)),
            ));
        }

        // The content must be the image type the extension claims
        let declared = if extension == "jpeg" { "jpg" } else { extension };
        let sniffed = infer::get(bytes).map(|kind| kind.extension());
        if sniffed == Some(declared) {
            return Ok(extension);
        }
        debug!("Rejected upload {}: sniffed type {:?}", file_name, sniffed);
        match sniffed {
            Some(actual @ ("jpg" | "png" | "webp")) => Err(ApiError::field(
                "image",
                format!("File content is {} but the name ends in .{}.", actual, extension),
            )),
            _ => Err(ApiError::field("image", "Upload a valid image.")),
        }
    }

    /// Write the bytes and return the path relative to the media root
    pub async fn save(&self, day: NaiveDate, extension: &str, bytes: &[u8]) -> ApiResult<String> {
        let relative = format!(
            "chantiers/photos/{}/{}.{}",
            day.format("%Y/%m/%d"),
            Uuid::new_v4(),
            extension
        );
        let absolute = self.media_root.join(&relative);

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, bytes).await?;

        debug!("Stored photo {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    /// Remove a stored blob; failures are logged, not returned
    pub async fn remove(&self, relative: &str) {
        let absolute = self.media_root.join(relative);
        if let Err(e) = tokio::fs::remove_file(&absolute).await {
            warn!("Failed to remove {}: {}", absolute.display(), e);
        }
    }
}

/// Byte count in the largest whole unit
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{} KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}
