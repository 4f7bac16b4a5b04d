//! Filesystem-backed object store.
//!
//! A bucket is a directory `<root>/<bucket>`; object keys are relative
//! paths inside it. Writes go to a temporary file in the target directory
//! and are renamed into place, so readers see either the old object or the
//! new one.

use super::{validate_key, ObjectStore};
use crate::error::{TallyError, TallyResult};
use async_trait::async_trait;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket: String,
    bucket_dir: PathBuf,
}

impl FsObjectStore {
    /// Open (and create if needed) the bucket directory under `root`.
    pub fn open(root: &Path, bucket: &str) -> TallyResult<Self> {
        if bucket.is_empty() || bucket.contains(&['/', '\\'][..]) || bucket.starts_with('.') {
            return Err(TallyError::MalformedInput(format!(
                "invalid bucket name '{}'",
                bucket
            )));
        }

        let bucket_dir = root.join(bucket);
        fs::create_dir_all(&bucket_dir)?;
        debug!("Opened bucket {} at {}", bucket, bucket_dir.display());

        Ok(Self {
            bucket: bucket.to_string(),
            bucket_dir,
        })
    }

    /// Directory holding this bucket's objects.
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn path_for(&self, key: &str) -> TallyResult<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> TallyResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> TallyResult<()> {
        let path = self.path_for(key)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| TallyError::Store(format!("write task failed: {}", e)))??;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> TallyResult<Vec<String>> {
        let bucket_dir = self.bucket_dir.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || list_keys(&bucket_dir, &prefix))
            .await
            .map_err(|e| TallyError::Store(format!("list task failed: {}", e)))?
    }
}

/// Write through a sibling temp file and rename it over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "object path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Walk the bucket and collect keys under a prefix.
fn list_keys(bucket_dir: &Path, prefix: &str) -> TallyResult<Vec<String>> {
    let mut keys = Vec::new();

    let walker = WalkDir::new(bucket_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry.file_name().to_str().unwrap_or(".")));

    for entry in walker {
        let entry = entry.map_err(|e| TallyError::Store(format!("walk failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(bucket_dir) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if key.starts_with(prefix) {
            keys.push(key);
        }
    }

    keys.sort();
    Ok(keys)
}

/// In-flight temp files and other dotfiles are never objects.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
