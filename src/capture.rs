//! Capturing raw submissions into the response bucket.
//!
//! Each captured submission gets its own object
//! `<quizId>/<month>-<year>/<uuid>.json`, and the caller receives the
//! storage notification that names it.

use crate::bucket::TimeBucket;
use crate::error::{TallyError, TallyResult};
use crate::models::{QuestionAnswers, QuizResponse, RawSubmission, StorageNotification};
use crate::store::ObjectStore;
use tracing::info;
use uuid::Uuid;

/// Store a raw submission and return the notification for it.
pub async fn capture<S: ObjectStore>(
    store: &S,
    response: QuizResponse,
    bucket: TimeBucket,
) -> TallyResult<StorageNotification> {
    if response.quiz_id.trim().is_empty() {
        return Err(TallyError::MalformedInput(
            "cannot capture a submission without a quizId".to_string(),
        ));
    }

    let submission_id = Uuid::new_v4().to_string();
    let key = bucket.raw_submission_key(&response.quiz_id, &submission_id);
    let bytes = RawSubmission {
        quiz_data: response,
    }
    .to_vec()?;

    store.put(&key, bytes).await?;
    info!("Captured submission {} in bucket {}", key, store.bucket());

    Ok(StorageNotification {
        bucket_name: store.bucket().to_string(),
        key,
    })
}

/// Parse a `QUESTION=ANSWER,ANSWER` command-line value.
///
/// An empty right-hand side records the question with no answers.
pub fn parse_answer_arg(value: &str) -> Result<QuestionAnswers, String> {
    let (question_id, answers) = value
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION=ANSWERS, got '{}'", value))?;

    let question_id = question_id.trim();
    if question_id.is_empty() {
        return Err(format!("missing question id in '{}'", value));
    }

    let answers: Vec<&str> = answers
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();

    Ok(QuestionAnswers::new(question_id, &answers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    #[tokio::test]
    async fn test_capture_stores_raw_submission() {
        let store = MemoryObjectStore::new("quiz-responses");
        let bucket = TimeBucket::new(6, 2020).unwrap();
        let response = QuizResponse {
            quiz_id: "1".to_string(),
            question_answers: vec![QuestionAnswers::new("0", &["0"])],
        };

        let notification = capture(&store, response.clone(), bucket).await.unwrap();

        assert_eq!(notification.bucket_name, "quiz-responses");
        assert!(notification.key.starts_with("1/6-2020/"));
        assert!(notification.key.ends_with(".json"));

        let bytes = store.get(&notification.key).await.unwrap().unwrap();
        let raw = RawSubmission::from_slice(&bytes).unwrap();
        assert_eq!(raw.quiz_data, response);
    }

    #[tokio::test]
    async fn test_capture_uses_unique_keys() {
        let store = MemoryObjectStore::new("quiz-responses");
        let bucket = TimeBucket::new(6, 2020).unwrap();
        let response = QuizResponse {
            quiz_id: "1".to_string(),
            question_answers: vec![],
        };

        let a = capture(&store, response.clone(), bucket).await.unwrap();
        let b = capture(&store, response, bucket).await.unwrap();
        assert_ne!(a.key, b.key);
    }

    #[tokio::test]
    async fn test_capture_requires_quiz_id() {
        let store = MemoryObjectStore::new("quiz-responses");
        let response = QuizResponse {
            quiz_id: " ".to_string(),
            question_answers: vec![],
        };
        let result = capture(&store, response, TimeBucket::new(1, 2021).unwrap()).await;
        assert!(matches!(result, Err(TallyError::MalformedInput(_))));
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_parse_answer_arg() {
        assert_eq!(
            parse_answer_arg("1=2, 3,4").unwrap(),
            QuestionAnswers::new("1", &["2", "3", "4"])
        );
        assert_eq!(parse_answer_arg("0=").unwrap(), QuestionAnswers::new("0", &[]));
        assert!(parse_answer_arg("no-equals").is_err());
        assert!(parse_answer_arg("=a").is_err());
    }
}
