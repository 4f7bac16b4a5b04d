//! Markdown and JSON rendering of aggregate documents.

use crate::bucket::TimeBucket;
use crate::models::{AggregateDocument, AnswerTally, QuestionAggregate};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// List the raw response files behind every tally.
    pub include_sources: bool,
}

/// Generate a complete Markdown report for one document.
pub fn generate_markdown_report(
    document: &AggregateDocument,
    bucket: TimeBucket,
    generated_at: DateTime<Utc>,
    options: ReportOptions,
) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# Quiz {} Results\n\n", document.quiz_id));

    output.push_str(&generate_metadata_section(document, bucket, generated_at));
    output.push_str(&generate_summary_section(document));
    output.push_str(&generate_questions_section(document, options));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(
    document: &AggregateDocument,
    bucket: TimeBucket,
    generated_at: DateTime<Utc>,
) -> String {
    let mut section = String::new();
    let responses: u64 = document.questions.iter().map(QuestionAggregate::total_count).sum();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Quiz:** `{}`\n", document.quiz_id));
    section.push_str(&format!("- **Period:** {}\n", bucket));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Questions:** {}\n", document.questions.len()));
    section.push_str(&format!("- **Answers Recorded:** {}\n", responses));
    section.push('\n');

    section
}

/// Generate the per-question overview table.
fn generate_summary_section(document: &AggregateDocument) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if document.questions.is_empty() {
        section.push_str("No questions have been answered yet.\n\n");
        return section;
    }

    section.push_str("| Question | Options Chosen | Answers | Top Answer |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");

    for question in &document.questions {
        let top = top_answer(question)
            .map(|t| format!("`{}` ({})", t.answer_id, t.count))
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            question.question_id,
            question.results.len(),
            question.total_count(),
            top
        ));
    }
    section.push('\n');

    section
}

/// Generate one block per question.
fn generate_questions_section(document: &AggregateDocument, options: ReportOptions) -> String {
    let mut section = String::new();

    if document.questions.is_empty() {
        return section;
    }

    section.push_str("## Questions\n\n");
    for question in &document.questions {
        section.push_str(&generate_question_block(question, options));
    }

    section
}

/// Generate the tally table for a single question.
fn generate_question_block(question: &QuestionAggregate, options: ReportOptions) -> String {
    let mut block = String::new();

    block.push_str(&format!("### Question {}\n\n", question.question_id));

    if question.results.is_empty() {
        block.push_str("*No answers recorded.*\n\n");
        return block;
    }

    let total = question.total_count();
    block.push_str("| Answer | Count | Share |\n");
    block.push_str("|:---|:---:|:---:|\n");
    for tally in &question.results {
        let share = if total == 0 {
            0.0
        } else {
            f64::from(tally.count) / total as f64 * 100.0
        };
        block.push_str(&format!(
            "| `{}` | {} | {:.1}% |\n",
            tally.answer_id, tally.count, share
        ));
    }
    block.push('\n');

    if options.include_sources {
        block.push_str("<details>\n<summary>Response Files</summary>\n\n");
        for tally in &question.results {
            block.push_str(&format!("- `{}`:", tally.answer_id));
            for file in &tally.raw_response_files {
                block.push_str(&format!(" `{}`", file));
            }
            block.push('\n');
        }
        block.push_str("\n</details>\n\n");
    }

    block
}

/// The most chosen answer; ties go to the one recorded first.
fn top_answer(question: &QuestionAggregate) -> Option<&AnswerTally> {
    question
        .results
        .iter()
        .fold(None, |best: Option<&AnswerTally>, tally| match best {
            Some(b) if b.count >= tally.count => Some(b),
            _ => Some(tally),
        })
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by QuizTally*\n");

    footer
}

/// Generate a JSON report (the stored document, pretty-printed).
pub fn generate_json_report(document: &AggregateDocument) -> Result<String> {
    serde_json::to_string_pretty(document).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_document() -> AggregateDocument {
        serde_json::from_str(
            r#"{"quizId":"1","questions":[
                {"questionId":"0","results":[
                    {"answerId":"a","count":1,"rawResponseFiles":["f1"]},
                    {"answerId":"b","count":3,"rawResponseFiles":["f2","f3","f4"]}
                ]},
                {"questionId":"1","results":[]}
            ]}"#,
        )
        .unwrap()
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generate_markdown_report() {
        let doc = create_test_document();
        let bucket = TimeBucket::new(6, 2020).unwrap();
        let markdown = generate_markdown_report(&doc, bucket, generated_at(), ReportOptions::default());

        assert!(markdown.contains("# Quiz 1 Results"));
        assert!(markdown.contains("- **Period:** 6-2020"));
        assert!(markdown.contains("- **Answers Recorded:** 4"));
        assert!(markdown.contains("| `0` | 2 | 4 | `b` (3) |"));
        assert!(markdown.contains("| `b` | 3 | 75.0% |"));
        assert!(markdown.contains("*No answers recorded.*"));
        assert!(!markdown.contains("Response Files"));
    }

    #[test]
    fn test_sources_are_optional() {
        let doc = create_test_document();
        let bucket = TimeBucket::new(6, 2020).unwrap();
        let markdown = generate_markdown_report(
            &doc,
            bucket,
            generated_at(),
            ReportOptions {
                include_sources: true,
            },
        );

        assert!(markdown.contains("Response Files"));
        assert!(markdown.contains("- `b`: `f2` `f3` `f4`"));
    }

    #[test]
    fn test_empty_document() {
        let doc = AggregateDocument::new("9");
        let bucket = TimeBucket::new(1, 2021).unwrap();
        let markdown = generate_markdown_report(&doc, bucket, generated_at(), ReportOptions::default());

        assert!(markdown.contains("No questions have been answered yet."));
        assert!(!markdown.contains("## Questions"));
    }

    #[test]
    fn test_top_answer_prefers_first_on_tie() {
        let question: QuestionAggregate = serde_json::from_str(
            r#"{"questionId":"0","results":[
                {"answerId":"x","count":2,"rawResponseFiles":["f1","f2"]},
                {"answerId":"y","count":2,"rawResponseFiles":["f3","f4"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(top_answer(&question).map(|t| t.answer_id.as_str()), Some("x"));
    }

    #[test]
    fn test_generate_json_report() {
        let doc = create_test_document();
        let json = generate_json_report(&doc).unwrap();

        assert!(json.contains("\"quizId\""));
        assert!(json.contains("\"rawResponseFiles\""));
        let back: AggregateDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
