//! Object-store abstraction.
//!
//! The pipeline only ever needs five operations on the bucket holding the
//! uploaded reports: paginated listing, get, put, delete and existence
//! checks. [`ObjectStore`] captures them so the fetch stage can run against
//! S3 in production and against a plain directory in tests and offline
//! runs.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`s3::S3Store`] | S3 REST API with SigV4 signing |
//! | [`fs::FsStore`] | Local directory, keys are relative paths |

pub mod fs;
pub mod s3;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;

/// Metadata of one listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full key within the bucket.
    pub key: String,
    pub size: u64,
    /// Entity tag, stripped of surrounding quotes.
    pub etag: String,
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Token for the next page, `None` when the listing is complete.
    pub next_token: Option<String>,
}

/// A remote bucket of objects addressed by `/`-separated keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, e.g. `s3://bucket` or a directory path.
    fn describe(&self) -> String;

    /// List one page of objects under `prefix`, continuing from `token`.
    async fn list_page(&self, prefix: &str, token: Option<String>) -> Result<ListPage>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Build the store named by `[store].kind`.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.kind.as_str() {
        "s3" => Ok(Arc::new(s3::S3Store::from_env(config)?)),
        "fs" => match &config.root {
            Some(root) => Ok(Arc::new(fs::FsStore::new(root.clone()))),
            None => bail!("store.root must be set when store.kind is 'fs'"),
        },
        other => bail!("Unknown store kind: '{}'. Must be s3 or fs.", other),
    }
}
