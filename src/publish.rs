//! Packaging and upload of the rendered site.
//!
//! The site directory is read back into a sorted `path → bytes` map, packed
//! into a zip archive with fixed timestamps (identical pages give an
//! identical archive) and handed to an [`Uploader`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::PublishConfig;
use crate::store::ObjectStore;

/// Receives the finished site and makes it publicly reachable.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `files` and return the public URL of the result.
    async fn upload(&self, files: &BTreeMap<String, Vec<u8>>) -> Result<String>;
}

/// Uploads the zipped site into the object store under a content-addressed
/// key, skipping the upload when that key already exists.
pub struct StoreUploader {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
    public_url_base: String,
}

impl StoreUploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: &PublishConfig) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.trim_end_matches('/').to_string(),
            public_url_base: config.public_url_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Uploader for StoreUploader {
    async fn upload(&self, files: &BTreeMap<String, Vec<u8>>) -> Result<String> {
        let archive = build_archive(files)?;
        let digest = hex::encode(Sha256::digest(&archive));
        let key = format!("{}/{}.zip", self.key_prefix, &digest[..16]);

        if self.store.exists(&key).await? {
            info!(key = %key, "identical archive already published");
        } else {
            let size = archive.len();
            self.store
                .put(&key, archive, "application/zip")
                .await
                .with_context(|| format!("Failed to upload archive '{}'", key))?;
            info!(key = %key, bytes = size, "published archive");
        }
        Ok(format!("{}/{}", self.public_url_base, key))
    }
}

/// Read every file under `dir` into a map keyed by `/`-separated relative path.
pub fn collect_files(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        files.insert(name, bytes);
    }
    Ok(files)
}

/// Deterministic zip of `files`.
pub fn build_archive(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for (name, bytes) in files {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Collect `dir` and hand it to `uploader`. Returns the public URL.
pub async fn publish_dir(dir: &Path, uploader: &dyn Uploader) -> Result<String> {
    let files = collect_files(dir)?;
    info!(files = files.len(), "publishing site");
    uploader.upload(&files).await
}
