use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Exit code reported for failures outside the submitted program
/// (workspace, file or container setup)
pub const INFRASTRUCTURE_EXIT_CODE: i64 = -1;

pub const PASS_SCORE: u32 = 100;
pub const FAIL_SCORE: u32 = 0;

/// Closed set of languages accepted at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    Java,
    C,
    Python,
    Cpp,
    Sql,
    JavaScript,
    TypeScript,
    Kotlin,
    Swift,
    Ruby,
    Php,
    Rust,
    #[serde(rename = "GOLANG", alias = "GO")]
    Go,
    Scala,
    Haskell,
    Elixir,
}

impl Language {
    pub const ALL: [Language; 16] = [
        Language::Java,
        Language::C,
        Language::Python,
        Language::Cpp,
        Language::Sql,
        Language::JavaScript,
        Language::TypeScript,
        Language::Kotlin,
        Language::Swift,
        Language::Ruby,
        Language::Php,
        Language::Rust,
        Language::Go,
        Language::Scala,
        Language::Haskell,
        Language::Elixir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::C => "c",
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::Sql => "sql",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Scala => "scala",
            Language::Haskell => "haskell",
            Language::Elixir => "elixir",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let language = match s.trim().to_lowercase().as_str() {
            "java" => Language::Java,
            "c" => Language::C,
            "python" | "py" => Language::Python,
            "cpp" | "c++" | "cxx" => Language::Cpp,
            "sql" | "sqlite" => Language::Sql,
            "javascript" | "js" | "node" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "kotlin" | "kt" => Language::Kotlin,
            "swift" => Language::Swift,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "rust" | "rs" => Language::Rust,
            "go" | "golang" => Language::Go,
            "scala" => Language::Scala,
            "haskell" | "hs" => Language::Haskell,
            "elixir" | "ex" => Language::Elixir,
            _ => return Err(UnknownLanguage(s.to_string())),
        };
        Ok(language)
    }
}

/// One sandboxed run: what to execute and how long it may take
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source_code: String,
    /// Schema/setup script (SQL) run before the source
    #[serde(default)]
    pub initial_code: Option<String>,
    #[serde(default)]
    pub stdin: Option<String>,
    pub timeout_secs: u64,
}

impl ExecutionRequest {
    pub fn new(language: Language, source_code: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            language,
            source_code: source_code.into(),
            initial_code: None,
            stdin: None,
            timeout_secs,
        }
    }

    pub fn with_initial_code(mut self, initial_code: Option<String>) -> Self {
        self.initial_code = initial_code;
        self
    }

    pub fn with_stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    /// Stdin only counts when it carries something other than whitespace
    pub fn has_stdin(&self) -> bool {
        self.stdin.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Outcome of exactly one sandboxed run
///
/// `timed_out == true` always comes with `exit_code == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn infrastructure_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            execution_time_ms: 0,
            exit_code: Some(INFRASTRUCTURE_EXIT_CODE),
            timed_out: false,
        }
    }

    pub fn timed_out(execution_time_ms: u64, message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            execution_time_ms,
            exit_code: None,
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Earlier test case shape: ordered scalar inputs, one per stdin line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTestCase {
    /// Missing and `null` both mean no input
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input: Vec<Value>,
    pub output: Value,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Free-form input (scalar or list) plus expected output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredTestCase {
    #[serde(default)]
    pub input: Value,
    pub output: Value,
}

/// Grading configuration owned by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub language: Language,
    #[serde(default)]
    pub initial_code: Option<String>,
    #[serde(default)]
    pub input_data: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub is_compare: bool,
    #[serde(default)]
    pub compare_code: Option<String>,
    #[serde(default)]
    pub is_test_case: bool,
    /// Serialized JSON list of input/output pairs
    #[serde(default)]
    pub test_cases: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub question_id: Uuid,
    pub code: String,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Completed,
    Failed,
}

/// Final decision for one grading attempt. Scores are binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub output: String,
    pub error: String,
    pub expected_output: String,
    pub execution_time_ms: u64,
    pub exit_code: Option<i64>,
}

impl Verdict {
    pub fn score(&self) -> u32 {
        if self.passed {
            PASS_SCORE
        } else {
            FAIL_SCORE
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub question_id: Uuid,
    pub code: String,
    pub language: Language,
    pub score: u32,
    pub output: Option<String>,
    pub error: Option<String>,
    pub expected_output: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn pending(id: Uuid, request: &SubmissionRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            question_id: request.question_id,
            code: request.code.clone(),
            language: request.language,
            score: FAIL_SCORE,
            output: None,
            error: None,
            expected_output: None,
            execution_time_ms: None,
            status: SubmissionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self, verdict: Verdict) {
        self.score = verdict.score();
        self.output = Some(verdict.output);
        self.error = Some(verdict.error);
        self.expected_output = Some(verdict.expected_output);
        self.execution_time_ms = Some(verdict.execution_time_ms);
        self.status = SubmissionStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.score = FAIL_SCORE;
        self.error = Some(message.into());
        self.status = SubmissionStatus::Failed;
        self.updated_at = Utc::now();
    }
}

/// Single execution without persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugRequest {
    pub code: String,
    pub language: Language,
    #[serde(default)]
    pub initial_code: Option<String>,
    #[serde(default)]
    pub input_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugResponse {
    pub output: String,
    pub error: String,
    pub execution_time_ms: u64,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub successful: bool,
    pub language: Language,
}

impl DebugResponse {
    pub fn from_result(result: ExecutionResult, language: Language) -> Self {
        let successful = result.is_success();
        Self {
            output: result.stdout,
            error: result.stderr,
            execution_time_ms: result.execution_time_ms,
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            successful,
            language,
        }
    }

    pub fn error(message: impl Into<String>, language: Language) -> Self {
        Self {
            output: String::new(),
            error: message.into(),
            execution_time_ms: 0,
            exit_code: Some(INFRASTRUCTURE_EXIT_CODE),
            timed_out: false,
            successful: false,
            language,
        }
    }
}

/// Unit of work on the grading queue; `id` becomes the submission id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJob {
    pub id: Uuid,
    pub request: SubmissionRequest,
}
