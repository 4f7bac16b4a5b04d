//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::capture::parse_answer_arg;
use crate::models::QuestionAnswers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// QuizTally - monthly quiz response aggregation
///
/// Captures raw quiz submissions into a response bucket and folds them
/// into one tally document per quiz per month.
///
/// Examples:
///   quiztally capture --quiz 1 --answer 0=0 --answer 1=2,3,4
///   quiztally process --message '{"bucketName":"quiz-responses","key":"1/6-2020/x.json"}'
///   quiztally process --prefix 1/6-2020/
///   quiztally show --quiz 1 --month 6 --year 2020 --format json
///   quiztally init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .quiztally.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the bucket directories
    #[arg(long, global = true, value_name = "DIR", env = "QUIZTALLY_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Bucket raw submissions are captured into
    #[arg(long, global = true, value_name = "NAME", env = "QUIZTALLY_RAW_BUCKET")]
    pub raw_bucket: Option<String>,

    /// Bucket aggregate documents are written to
    #[arg(long, global = true, value_name = "NAME", env = "QUIZTALLY_AGGREGATE_BUCKET")]
    pub aggregate_bucket: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store a raw submission and print its storage notification
    Capture(CaptureArgs),
    /// Aggregate raw submissions into monthly documents
    Process(ProcessArgs),
    /// Render the aggregate for a quiz
    Show(ShowArgs),
    /// Generate a default .quiztally.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Quiz identifier
    #[arg(long, value_name = "ID", required_unless_present = "file")]
    pub quiz: Option<String>,

    /// Answers for one question, repeatable
    ///
    /// Example: --answer 1=2,3,4
    #[arg(short, long = "answer", value_name = "QUESTION=ANSWERS", value_parser = parse_answer_arg)]
    pub answers: Vec<QuestionAnswers>,

    /// Read a raw submission ({"quizData": ...}) from a file instead
    #[arg(long, value_name = "FILE", conflicts_with_all = ["quiz", "answers"])]
    pub file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Raw submission keys to aggregate
    #[arg(value_name = "KEY")]
    pub keys: Vec<String>,

    /// Storage notification message ({"bucketName": ..., "key": ...})
    #[arg(long, value_name = "JSON")]
    pub message: Option<String>,

    /// Aggregate every raw submission under this key prefix
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Number of submissions loaded and documents written concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ShowArgs {
    /// Quiz identifier
    #[arg(long, value_name = "ID")]
    pub quiz: String,

    /// Month of the bucket (defaults to the current month)
    #[arg(long, requires = "year")]
    pub month: Option<u32>,

    /// Year of the bucket (defaults to the current year)
    #[arg(long, requires = "month")]
    pub year: Option<i32>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// List the raw response files behind every tally
    #[arg(long)]
    pub sources: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Capture(capture) => {
                if let Some(ref file) = capture.file {
                    if !file.is_file() {
                        return Err(format!("Submission file does not exist: {}", file.display()));
                    }
                }
            }
            Command::Process(process) => {
                if process.keys.is_empty() && process.message.is_none() && process.prefix.is_none() {
                    return Err("Nothing to process: give keys, --message or --prefix".to_string());
                }
                if process.concurrency == Some(0) {
                    return Err("Concurrency must be at least 1".to_string());
                }
            }
            Command::Show(show) => {
                if let Some(month) = show.month {
                    if !(1..=12).contains(&month) {
                        return Err("Month must be between 1 and 12".to_string());
                    }
                }
            }
            Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("quiztally").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_capture() {
        let args = parse(&["capture", "--quiz", "1", "--answer", "0=0", "-a", "1=2,3,4"]);
        let Command::Capture(capture) = args.command else {
            panic!("expected capture");
        };
        assert_eq!(capture.quiz.as_deref(), Some("1"));
        assert_eq!(
            capture.answers,
            vec![
                QuestionAnswers::new("0", &["0"]),
                QuestionAnswers::new("1", &["2", "3", "4"]),
            ]
        );
    }

    #[test]
    fn test_capture_requires_quiz_or_file() {
        assert!(Args::try_parse_from(["quiztally", "capture", "--answer", "0=0"]).is_err());
        assert!(Args::try_parse_from([
            "quiztally", "capture", "--quiz", "1", "--file", "x.json"
        ])
        .is_err());
    }

    #[test]
    fn test_bad_answer_value() {
        assert!(Args::try_parse_from(["quiztally", "capture", "--quiz", "1", "--answer", "oops"]).is_err());
    }

    #[test]
    fn test_validation_nothing_to_process() {
        let args = parse(&["process"]);
        assert!(args.validate().is_err());

        let args = parse(&["process", "--prefix", "1/"]);
        assert!(args.validate().is_ok());

        let args = parse(&["process", "1/6-2020/a.json", "--concurrency", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_show_month_and_year_go_together() {
        assert!(Args::try_parse_from(["quiztally", "show", "--quiz", "1", "--month", "6"]).is_err());

        let args = parse(&["show", "--quiz", "1", "--month", "13", "--year", "2020"]);
        assert!(args.validate().is_err());

        let args = parse(&["show", "--quiz", "1", "--month", "6", "--year", "2020", "--format", "json"]);
        assert!(args.validate().is_ok());
        let Command::Show(show) = args.command else {
            panic!("expected show");
        };
        assert_eq!(show.format, OutputFormat::Json);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["init-config", "--verbose", "--quiet"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["init-config"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
