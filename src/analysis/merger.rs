//! Merging submissions into aggregate documents.
//!
//! The merger is pure: it never touches storage and never mutates the
//! document it is given. Callers get back a fresh document (or an error)
//! together with the list of tally changes that produced it.

use crate::error::{TallyError, TallyResult};
use crate::models::{AggregateDocument, AnswerTally, QuestionAggregate, Submission};
use std::fmt;

/// A single change applied to a document during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyChange {
    /// A question seen for the first time in this document.
    QuestionAdded { question_id: String },
    /// An answer seen for the first time under an existing or new question.
    AnswerAdded {
        question_id: String,
        answer_id: String,
    },
    /// An existing tally was bumped; `count` is the new value.
    AnswerIncremented {
        question_id: String,
        answer_id: String,
        count: u32,
    },
}

impl fmt::Display for TallyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TallyChange::QuestionAdded { question_id } => {
                write!(f, "question {} added", question_id)
            }
            TallyChange::AnswerAdded {
                question_id,
                answer_id,
            } => write!(f, "question {} answer {} added", question_id, answer_id),
            TallyChange::AnswerIncremented {
                question_id,
                answer_id,
                count,
            } => write!(
                f,
                "question {} answer {} now at {}",
                question_id, answer_id, count
            ),
        }
    }
}

/// The merged document plus what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub document: AggregateDocument,
    pub changes: Vec<TallyChange>,
}

/// Merge one submission into an optional prior document.
pub fn merge(
    existing: Option<&AggregateDocument>,
    submission: &Submission,
) -> TallyResult<AggregateDocument> {
    merge_with_changes(existing, submission).map(|outcome| outcome.document)
}

/// Merge one submission and report the changes applied.
pub fn merge_with_changes(
    existing: Option<&AggregateDocument>,
    submission: &Submission,
) -> TallyResult<MergeOutcome> {
    fold(existing, std::slice::from_ref(submission))
}

/// Apply several submissions in order, as if merged one at a time.
///
/// Every submission is checked before anything is applied, so either all
/// of them land in the returned document or none do.
pub fn fold(
    existing: Option<&AggregateDocument>,
    submissions: &[Submission],
) -> TallyResult<MergeOutcome> {
    let quiz_id = match (existing, submissions.first()) {
        (Some(doc), _) => doc.quiz_id.as_str(),
        (None, Some(first)) => first.quiz_id.as_str(),
        (None, None) => {
            return Err(TallyError::MalformedInput(
                "no submissions to merge".to_string(),
            ))
        }
    };

    for submission in submissions {
        submission.validate()?;
        if submission.quiz_id != quiz_id {
            return Err(TallyError::QuizMismatch {
                expected: quiz_id.to_string(),
                found: submission.quiz_id.clone(),
            });
        }
    }

    let mut document = match existing {
        Some(doc) => doc.clone(),
        None => AggregateDocument::new(quiz_id),
    };
    let mut changes = Vec::new();

    for submission in submissions {
        apply(&mut document, submission, &mut changes);
    }

    Ok(MergeOutcome { document, changes })
}

/// Fold one validated submission into a working copy.
fn apply(document: &mut AggregateDocument, submission: &Submission, changes: &mut Vec<TallyChange>) {
    for question_answers in &submission.question_answers {
        let question_id = &question_answers.question_id;

        let index = match document
            .questions
            .iter()
            .position(|q| &q.question_id == question_id)
        {
            Some(index) => index,
            None => {
                document.questions.push(QuestionAggregate::new(question_id.clone()));
                changes.push(TallyChange::QuestionAdded {
                    question_id: question_id.clone(),
                });
                document.questions.len() - 1
            }
        };
        let question = &mut document.questions[index];

        for answer_id in &question_answers.answers {
            match question.results.iter_mut().find(|r| &r.answer_id == answer_id) {
                Some(tally) => {
                    tally.record(submission.source_ref.clone());
                    changes.push(TallyChange::AnswerIncremented {
                        question_id: question_id.clone(),
                        answer_id: answer_id.clone(),
                        count: tally.count,
                    });
                }
                None => {
                    question
                        .results
                        .push(AnswerTally::new(answer_id.clone(), submission.source_ref.clone()));
                    changes.push(TallyChange::AnswerAdded {
                        question_id: question_id.clone(),
                        answer_id: answer_id.clone(),
                    });
                }
            }
        }
    }
}
