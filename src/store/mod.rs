//! Object storage for raw submissions and aggregate documents.
//!
//! Two layers live here:
//! - [`ObjectStore`]: a bucket of opaque byte objects addressed by key.
//! - [`AggregateStore`]: typed access to aggregate documents on top of any
//!   object store, keyed by quiz id and [`TimeBucket`].
//!
//! The object store offers no conditional writes. Two processes merging
//! into the same aggregate key at the same time can lose an update; inside
//! one process the [`crate::processor::SubmissionProcessor`] serializes
//! writers per key.

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use crate::bucket::TimeBucket;
use crate::error::{TallyError, TallyResult};
use crate::models::AggregateDocument;
use async_trait::async_trait;
use tracing::debug;

/// A named bucket of byte objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store was opened on.
    fn bucket(&self) -> &str;

    /// Fetch an object. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> TallyResult<Option<Vec<u8>>>;

    /// Store an object, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> TallyResult<()>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> TallyResult<Vec<String>>;
}

/// Reject keys that could escape the bucket or alias another key.
pub fn validate_key(key: &str) -> TallyResult<()> {
    let invalid = |reason: &str| {
        Err(TallyError::MalformedInput(format!(
            "invalid object key '{}': {}",
            key, reason
        )))
    };

    if key.is_empty() {
        return invalid("key is empty");
    }
    if key.starts_with('/') {
        return invalid("key must be relative");
    }
    if key.contains('\\') {
        return invalid("backslashes are not allowed");
    }
    for segment in key.split('/') {
        match segment {
            "" => return invalid("empty path segment"),
            "." | ".." => return invalid("relative path segment"),
            s if s.starts_with('.') => return invalid("hidden path segment"),
            _ => {}
        }
    }

    Ok(())
}

/// Aggregate documents stored in an object store.
pub struct AggregateStore<S> {
    objects: S,
}

impl<S: ObjectStore> AggregateStore<S> {
    pub fn new(objects: S) -> Self {
        Self { objects }
    }

    /// The underlying object store.
    pub fn objects(&self) -> &S {
        &self.objects
    }

    /// Load and check the aggregate for a quiz in a bucket.
    ///
    /// Returns `Ok(None)` when no document has been written yet. Bytes that
    /// do not decode, or decode into a document that breaks a tally
    /// invariant, are an error rather than an empty document.
    pub async fn load(
        &self,
        quiz_id: &str,
        bucket: TimeBucket,
    ) -> TallyResult<Option<AggregateDocument>> {
        let key = bucket.aggregate_key(quiz_id);

        let Some(bytes) = self.objects.get(&key).await? else {
            debug!("No aggregate at {}", key);
            return Ok(None);
        };

        let document: AggregateDocument = serde_json::from_slice(&bytes)
            .map_err(|source| TallyError::Serialization {
                key: key.clone(),
                source,
            })?;

        if let Err(reason) = document.validate() {
            return Err(TallyError::CorruptDocument { key, reason });
        }
        if document.quiz_id != quiz_id {
            return Err(TallyError::CorruptDocument {
                reason: format!("document belongs to quiz '{}'", document.quiz_id),
                key,
            });
        }

        debug!("Loaded aggregate {} ({} bytes)", key, bytes.len());
        Ok(Some(document))
    }

    /// Write a document to its key for the bucket. Returns the key.
    pub async fn save(&self, document: &AggregateDocument, bucket: TimeBucket) -> TallyResult<String> {
        let key = bucket.aggregate_key(&document.quiz_id);
        let bytes = serde_json::to_vec(document).map_err(|source| TallyError::Serialization {
            key: key.clone(),
            source,
        })?;

        debug!("Writing aggregate {} ({} bytes)", key, bytes.len());
        self.objects.put(&key, bytes).await?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerTally, QuestionAggregate};

    fn bucket() -> TimeBucket {
        TimeBucket::new(6, 2020).unwrap()
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("1/6-2020/abc.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("1/../2/x.json").is_err());
        assert!(validate_key("1//x.json").is_err());
        assert!(validate_key("1/.tmp123").is_err());
        assert!(validate_key("1\\x.json").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_document() {
        let store = AggregateStore::new(MemoryObjectStore::new("aggregates"));
        assert!(store.load("1", bucket()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = AggregateStore::new(MemoryObjectStore::new("aggregates"));
        let mut doc = AggregateDocument::new("1");
        let mut question = QuestionAggregate::new("0");
        question.results.push(AnswerTally::new("0", "f1"));
        doc.questions.push(question);

        let key = store.save(&doc, bucket()).await.unwrap();
        assert_eq!(key, "1/6-2020/1.json");
        assert_eq!(store.load("1", bucket()).await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_undecodable_document_is_an_error() {
        let objects = MemoryObjectStore::new("aggregates");
        objects
            .put("1/6-2020/1.json", b"{not json".to_vec())
            .await
            .unwrap();
        let store = AggregateStore::new(objects);

        let err = store.load("1", bucket()).await.unwrap_err();
        assert!(matches!(err, TallyError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_inconsistent_document_is_an_error() {
        let objects = MemoryObjectStore::new("aggregates");
        objects
            .put(
                "1/6-2020/1.json",
                br#"{"quizId":"1","questions":[{"questionId":"0","results":[{"answerId":"0","count":2,"rawResponseFiles":["f1"]}]}]}"#.to_vec(),
            )
            .await
            .unwrap();
        objects
            .put("2/6-2020/2.json", br#"{"quizId":"7","questions":[]}"#.to_vec())
            .await
            .unwrap();
        let store = AggregateStore::new(objects);

        let err = store.load("1", bucket()).await.unwrap_err();
        assert!(matches!(err, TallyError::CorruptDocument { .. }));
        let err = store.load("2", bucket()).await.unwrap_err();
        assert!(matches!(err, TallyError::CorruptDocument { .. }));
    }
}
