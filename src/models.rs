//! Data models for quiz submissions and aggregate documents.
//!
//! Wire names follow the JSON produced by the capture side and the
//! documents already sitting in the aggregate bucket, so every struct
//! here uses camelCase field names on the wire.

use crate::error::{TallyError, TallyResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One question and the options a respondent picked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswers {
    /// Question identifier.
    #[serde(rename = "id")]
    pub question_id: String,
    /// Selected answer identifiers, in the order they were submitted.
    #[serde(default)]
    pub answers: Vec<String>,
}

impl QuestionAnswers {
    pub fn new(question_id: impl Into<String>, answers: &[&str]) -> Self {
        Self {
            question_id: question_id.into(),
            answers: answers.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Body of a raw submission artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResponse {
    pub quiz_id: String,
    #[serde(default)]
    pub question_answers: Vec<QuestionAnswers>,
}

/// Raw submission artifact as stored in the response bucket.
///
/// ```json
/// {"quizData":{"quizId":"1","questionAnswers":[{"id":"0","answers":["0"]}]}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    pub quiz_data: QuizResponse,
}

impl RawSubmission {
    /// Decode a raw submission artifact.
    pub fn from_slice(bytes: &[u8]) -> TallyResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            TallyError::MalformedInput(format!("Unable to decode raw submission: {}", e))
        })
    }

    /// Encode for storage in the response bucket.
    pub fn to_vec(&self) -> TallyResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TallyError::MalformedInput(format!("Unable to encode submission: {}", e)))
    }
}

/// One respondent's answers for one quiz, tagged with where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Quiz identifier.
    pub quiz_id: String,
    /// Answered questions, in submission order.
    pub question_answers: Vec<QuestionAnswers>,
    /// Object key of the raw artifact this submission was read from.
    pub source_ref: String,
}

impl Submission {
    /// Build a submission from a decoded artifact and its object key.
    pub fn from_raw(raw: RawSubmission, source_ref: impl Into<String>) -> TallyResult<Self> {
        let submission = Self {
            quiz_id: raw.quiz_data.quiz_id,
            question_answers: raw.quiz_data.question_answers,
            source_ref: source_ref.into(),
        };
        submission.validate()?;
        Ok(submission)
    }

    /// Reject submissions that cannot be attributed to a quiz or a source.
    pub fn validate(&self) -> TallyResult<()> {
        if self.quiz_id.trim().is_empty() {
            return Err(TallyError::MalformedInput(
                "submission has no quizId".to_string(),
            ));
        }
        if self.source_ref.trim().is_empty() {
            return Err(TallyError::MalformedInput(format!(
                "submission for quiz '{}' has no source reference",
                self.quiz_id
            )));
        }
        Ok(())
    }
}

/// Storage notification naming a freshly captured raw submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNotification {
    pub bucket_name: String,
    pub key: String,
}

impl StorageNotification {
    /// Parse a notification message body.
    pub fn parse(message: &str) -> TallyResult<Self> {
        let notification: Self = serde_json::from_str(message).map_err(|e| {
            TallyError::MalformedInput(format!("Unable to decode storage notification: {}", e))
        })?;
        if notification.key.is_empty() {
            return Err(TallyError::MalformedInput(
                "storage notification has an empty key".to_string(),
            ));
        }
        Ok(notification)
    }
}

/// Count and provenance for one answer option to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerTally {
    pub answer_id: String,
    pub count: u32,
    /// One entry per contribution, in merge order.
    pub raw_response_files: Vec<String>,
}

impl AnswerTally {
    /// First contribution for an answer.
    pub fn new(answer_id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            answer_id: answer_id.into(),
            count: 1,
            raw_response_files: vec![source_ref.into()],
        }
    }

    /// Record another contribution.
    pub fn record(&mut self, source_ref: impl Into<String>) {
        self.count += 1;
        self.raw_response_files.push(source_ref.into());
    }
}

/// All tallies for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAggregate {
    pub question_id: String,
    #[serde(default)]
    pub results: Vec<AnswerTally>,
}

impl QuestionAggregate {
    pub fn new(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            results: Vec::new(),
        }
    }

    /// Look up the tally for an answer.
    pub fn answer(&self, answer_id: &str) -> Option<&AnswerTally> {
        self.results.iter().find(|r| r.answer_id == answer_id)
    }

    /// Total contributions across every answer of this question.
    pub fn total_count(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.count)).sum()
    }
}

/// The persisted summary for one quiz within one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateDocument {
    pub quiz_id: String,
    /// Older documents call this field `questionData`.
    #[serde(default, alias = "questionData")]
    pub questions: Vec<QuestionAggregate>,
}

impl AggregateDocument {
    /// An empty document for a quiz.
    pub fn new(quiz_id: impl Into<String>) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            questions: Vec::new(),
        }
    }

    /// Look up a question by id.
    pub fn question(&self, question_id: &str) -> Option<&QuestionAggregate> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    /// Check the structural invariants of a document.
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.quiz_id.is_empty() {
            return Err("document has no quizId".to_string());
        }

        let mut question_ids = HashSet::new();
        for question in &self.questions {
            if !question_ids.insert(question.question_id.as_str()) {
                return Err(format!("duplicate question '{}'", question.question_id));
            }

            let mut answer_ids = HashSet::new();
            for tally in &question.results {
                if !answer_ids.insert(tally.answer_id.as_str()) {
                    return Err(format!(
                        "duplicate answer '{}' in question '{}'",
                        tally.answer_id, question.question_id
                    ));
                }
                if tally.count == 0 {
                    return Err(format!(
                        "answer '{}' in question '{}' has a zero count",
                        tally.answer_id, question.question_id
                    ));
                }
                if tally.count as usize != tally.raw_response_files.len() {
                    return Err(format!(
                        "answer '{}' in question '{}' has count {} but {} source references",
                        tally.answer_id,
                        question.question_id,
                        tally.count,
                        tally.raw_response_files.len()
                    ));
                }
            }
        }

        Ok(())
    }
}
