//! Read-merge-write processing of submissions.
//!
//! Each aggregate key is handled by at most one merge at a time within this
//! process. The lock table only covers this process; separate processes
//! writing the same key still race.

use crate::analysis::{self, TallyChange};
use crate::bucket::TimeBucket;
use crate::error::{TallyError, TallyResult};
use crate::models::{RawSubmission, StorageNotification, Submission};
use crate::store::{AggregateStore, ObjectStore};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of writing one aggregate document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Key of the document that was written.
    pub aggregate_key: String,
    /// Source references merged by this write, in merge order.
    pub source_refs: Vec<String>,
    /// Tally changes applied.
    pub changes: Vec<TallyChange>,
}

/// A submission that could not be aggregated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSubmission {
    pub key: String,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub written: Vec<MergeReport>,
    pub failed: Vec<FailedSubmission>,
}

impl BatchSummary {
    /// Number of submissions that made it into a document.
    pub fn merged_count(&self) -> usize {
        self.written.iter().map(|r| r.source_refs.len()).sum()
    }
}

/// Drives submissions from the raw bucket into the aggregate bucket.
pub struct SubmissionProcessor<R, A> {
    raw: R,
    aggregates: AggregateStore<A>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: ObjectStore, A: ObjectStore> SubmissionProcessor<R, A> {
    pub fn new(raw: R, aggregates: A) -> Self {
        Self {
            raw,
            aggregates: AggregateStore::new(aggregates),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The bucket raw submissions are read from.
    pub fn raw_store(&self) -> &R {
        &self.raw
    }

    /// The documents this processor writes.
    pub fn aggregate_store(&self) -> &AggregateStore<A> {
        &self.aggregates
    }

    /// Resolve a storage notification to a raw submission key.
    pub fn notification_key(&self, notification: &StorageNotification) -> TallyResult<String> {
        if notification.bucket_name != self.raw.bucket() {
            return Err(TallyError::MalformedInput(format!(
                "notification is for bucket '{}', expected '{}'",
                notification.bucket_name,
                self.raw.bucket()
            )));
        }
        Ok(notification.key.clone())
    }

    /// Read and decode a raw submission; its key becomes the source reference.
    pub async fn load_submission(&self, key: &str) -> TallyResult<Submission> {
        let bytes = self.raw.get(key).await?.ok_or_else(|| {
            TallyError::MalformedInput(format!(
                "raw submission {} not found in bucket {}",
                key,
                self.raw.bucket()
            ))
        })?;
        let raw = RawSubmission::from_slice(&bytes)?;
        Submission::from_raw(raw, key)
    }

    /// Aggregate the submission named by a storage notification.
    pub async fn handle_notification(
        &self,
        notification: &StorageNotification,
        bucket: TimeBucket,
    ) -> TallyResult<MergeReport> {
        let key = self.notification_key(notification)?;
        let submission = self.load_submission(&key).await?;
        self.process(&submission, bucket).await
    }

    /// Merge one submission into its quiz's document for `bucket`.
    pub async fn process(&self, submission: &Submission, bucket: TimeBucket) -> TallyResult<MergeReport> {
        self.merge_into(&submission.quiz_id, bucket, std::slice::from_ref(submission))
            .await
    }

    /// Merge several submissions for one quiz with a single write.
    pub async fn process_group(
        &self,
        quiz_id: &str,
        submissions: &[Submission],
        bucket: TimeBucket,
    ) -> TallyResult<MergeReport> {
        self.merge_into(quiz_id, bucket, submissions).await
    }

    /// Load every key, group by quiz and write each quiz's document once.
    ///
    /// Keys that fail to load are reported and skipped. A quiz whose
    /// document cannot be read or written fails every submission in it.
    pub async fn process_keys(
        &self,
        keys: &[String],
        bucket: TimeBucket,
        concurrency: usize,
        progress: Option<&ProgressBar>,
    ) -> BatchSummary {
        let concurrency = concurrency.max(1);
        let mut summary = BatchSummary::default();

        let loaded: Vec<(String, TallyResult<Submission>)> = stream::iter(keys.iter().cloned())
            .map(|key| async move {
                let result = self.load_submission(&key).await;
                (key, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut groups: BTreeMap<String, Vec<Submission>> = BTreeMap::new();
        for (key, result) in loaded {
            match result {
                Ok(submission) => groups
                    .entry(submission.quiz_id.clone())
                    .or_default()
                    .push(submission),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    summary.failed.push(FailedSubmission {
                        key,
                        error: e.to_string(),
                    });
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                }
            }
        }

        let results: Vec<(Vec<String>, TallyResult<MergeReport>)> = stream::iter(groups)
            .map(|(quiz_id, submissions)| async move {
                let keys: Vec<String> = submissions.iter().map(|s| s.source_ref.clone()).collect();
                let result = self.process_group(&quiz_id, &submissions, bucket).await;
                if let Some(pb) = progress {
                    pb.inc(submissions.len() as u64);
                }
                (keys, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (keys, result) in results {
            match result {
                Ok(report) => summary.written.push(report),
                Err(e) => {
                    warn!("Failed to aggregate {} submission(s): {}", keys.len(), e);
                    let error = e.to_string();
                    summary.failed.extend(keys.into_iter().map(|key| FailedSubmission {
                        key,
                        error: error.clone(),
                    }));
                }
            }
        }

        summary.written.sort_by(|a, b| a.aggregate_key.cmp(&b.aggregate_key));
        summary
    }

    async fn merge_into(
        &self,
        quiz_id: &str,
        bucket: TimeBucket,
        submissions: &[Submission],
    ) -> TallyResult<MergeReport> {
        if let Some(other) = submissions.iter().find(|s| s.quiz_id != quiz_id) {
            return Err(TallyError::QuizMismatch {
                expected: quiz_id.to_string(),
                found: other.quiz_id.clone(),
            });
        }

        let aggregate_key = bucket.aggregate_key(quiz_id);
        let lock = self.key_lock(&aggregate_key).await;
        let result = {
            let _guard = lock.lock().await;
            self.merge_locked(quiz_id, bucket, submissions, aggregate_key.clone())
                .await
        };
        drop(lock);
        self.release_key_lock(&aggregate_key).await;
        result
    }

    async fn merge_locked(
        &self,
        quiz_id: &str,
        bucket: TimeBucket,
        submissions: &[Submission],
        aggregate_key: String,
    ) -> TallyResult<MergeReport> {
        let existing = self.aggregates.load(quiz_id, bucket).await?;
        if existing.is_none() {
            debug!("Creating new aggregate {}", aggregate_key);
        }

        let outcome = analysis::fold(existing.as_ref(), submissions)?;
        for change in &outcome.changes {
            debug!("{}: {}", aggregate_key, change);
        }

        self.aggregates.save(&outcome.document, bucket).await?;
        info!(
            "Merged {} submission(s) into {} ({} change(s))",
            submissions.len(),
            aggregate_key,
            outcome.changes.len()
        );

        Ok(MergeReport {
            aggregate_key,
            source_refs: submissions.iter().map(|s| s.source_ref.clone()).collect(),
            changes: outcome.changes,
        })
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Forget a key's lock once no task holds or waits on it.
    async fn release_key_lock(&self, key: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}
