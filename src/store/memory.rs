//! In-memory object store.
//!
//! Used by tests and dry runs. Reads and writes can be switched to fail so
//! callers' error paths can be exercised.

use super::{validate_key, ObjectStore};
use crate::error::{TallyError, TallyResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    failing_prefix: RwLock<Option<String>>,
    put_count: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Make every following `put` fail until switched back.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every following `get` fail until switched back.
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make writes to keys under `prefix` fail. `None` clears it.
    pub async fn set_failing_prefix(&self, prefix: Option<&str>) {
        *self.failing_prefix.write().await = prefix.map(str::to_string);
    }

    /// Number of successful writes so far.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> TallyResult<Option<Vec<u8>>> {
        validate_key(key)?;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(TallyError::Store(format!(
                "bucket {} is unavailable",
                self.bucket
            )));
        }
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> TallyResult<()> {
        validate_key(key)?;
        let prefix_fails = self
            .failing_prefix
            .read()
            .await
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if prefix_fails || self.fail_puts.load(Ordering::SeqCst) {
            return Err(TallyError::Store(format!(
                "bucket {} is rejecting writes",
                self.bucket
            )));
        }

        self.objects.write().await.insert(key.to_string(), bytes);
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> TallyResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
