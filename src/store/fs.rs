//! Directory-backed object store.
//!
//! Keys map to files under a root directory (`a/b/c.txt` →
//! `<root>/a/b/c.txt`). Used for offline runs against a mirrored bucket and
//! by the integration tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ListPage, ObjectMeta, ObjectStore};

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|c| !c.is_empty() && *c != "..")
            .fold(self.root.clone(), |p, c| p.join(c))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    /// Everything comes back in one page, sorted by key.
    async fn list_page(&self, prefix: &str, _token: Option<String>) -> Result<ListPage> {
        let mut objects = Vec::new();
        if !self.root.exists() {
            return Ok(ListPage::default());
        }

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Failed to walk store root {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            objects.push(ObjectMeta {
                key,
                size: bytes.len() as u64,
                etag: hex::encode(Sha256::digest(&bytes))[..32].to_string(),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(ListPage {
            objects,
            next_token: None,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read object {}", path.display()))
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write object {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}
