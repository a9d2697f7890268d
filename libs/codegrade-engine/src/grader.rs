/// Grading Orchestrator - Question + Submission → Verdict
///
/// **Core Responsibility:**
/// Pick the grading mode a question is configured for, drive the sandbox
/// through the runs that mode needs and reduce them to a binary verdict.
///
/// **Mode precedence:**
/// structured test cases > legacy test cases > reference comparator > direct answer
///
/// **Error Boundary:**
/// Program failures are verdicts. Configuration problems (mismatched
/// language, missing or malformed test data, failing comparator) are
/// `GradingError`s and turn the submission `FAILED` in `process_submission`.

use crate::evaluator::{self, CaseStatus};
use crate::sandbox::Sandbox;
use codegrade_common::config::{DEBUG_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use codegrade_common::types::{
    DebugRequest, DebugResponse, ExecutionRequest, ExecutionResult, GradingJob, Language, Question,
    Submission, SubmissionRequest, Verdict,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("Question not found with ID: {0}")]
    QuestionNotFound(Uuid),

    #[error("Failed to load question: {0}")]
    QuestionUnavailable(String),

    #[error(
        "The submitted code language ({submitted}) does not match the question language ({expected})"
    )]
    LanguageMismatch { expected: Language, submitted: Language },

    #[error("Question has no test cases to run")]
    MissingTestCases,

    #[error("Malformed test cases: {0}")]
    MalformedTestCases(#[source] serde_json::Error),

    #[error("Question has no expected answer")]
    MissingAnswer,

    #[error("Reference solution failed: {0}")]
    ComparatorFailed(String),
}

/// How a question decides pass/fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingMode<'q> {
    StructuredTestCases(&'q str),
    LegacyTestCases(&'q str),
    ReferenceComparator(&'q str),
    DirectAnswer(&'q str),
}

impl<'q> GradingMode<'q> {
    pub fn for_question(question: &'q Question) -> Result<Self, GradingError> {
        let test_cases = question.test_cases.as_deref().filter(|t| !t.trim().is_empty());

        if let Some(raw) = test_cases {
            return Ok(if question.is_test_case {
                GradingMode::StructuredTestCases(raw)
            } else {
                GradingMode::LegacyTestCases(raw)
            });
        }

        if question.is_test_case {
            return Err(GradingError::MissingTestCases);
        }

        if question.is_compare {
            if let Some(code) = question.compare_code.as_deref() {
                return Ok(GradingMode::ReferenceComparator(code));
            }
        }

        question
            .answer
            .as_deref()
            .map(GradingMode::DirectAnswer)
            .ok_or(GradingError::MissingAnswer)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GradingMode::StructuredTestCases(_) => "structured",
            GradingMode::LegacyTestCases(_) => "legacy",
            GradingMode::ReferenceComparator(_) => "comparator",
            GradingMode::DirectAnswer(_) => "direct",
        }
    }
}

/// One test case ready to run
struct PreparedCase {
    label: String,
    stdin: String,
    expected: String,
}

struct CaseFailure {
    index: usize,
    status: CaseStatus,
    expected: String,
}

/// Result of the sequential test-case loop
struct CaseRun {
    last: Option<ExecutionResult>,
    failure: Option<CaseFailure>,
    execution_time_ms: u64,
}

pub struct Grader<S: Sandbox> {
    sandbox: S,
    timeout_secs: u64,
    debug_timeout_secs: u64,
}

impl<S: Sandbox> Grader<S> {
    pub fn new(sandbox: S) -> Self {
        Self {
            sandbox,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            debug_timeout_secs: DEBUG_TIMEOUT_SECS,
        }
    }

    pub fn with_timeouts(mut self, timeout_secs: u64, debug_timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self.debug_timeout_secs = debug_timeout_secs;
        self
    }

    fn request(&self, question: &Question, code: &str, stdin: Option<String>) -> ExecutionRequest {
        ExecutionRequest::new(question.language, code, self.timeout_secs)
            .with_initial_code(question.initial_code.clone())
            .with_stdin(stdin)
    }

    #[instrument(
        skip(self, question, request),
        fields(question_id = %question.id, language = %request.language)
    )]
    pub async fn grade(
        &self,
        question: &Question,
        request: &SubmissionRequest,
    ) -> Result<Verdict, GradingError> {
        if question.language != request.language {
            return Err(GradingError::LanguageMismatch {
                expected: question.language,
                submitted: request.language,
            });
        }

        let mode = GradingMode::for_question(question)?;
        debug!(mode = mode.name(), "Grading mode selected");

        let verdict = match mode {
            GradingMode::StructuredTestCases(raw) => {
                self.grade_structured(question, &request.code, raw).await?
            }
            GradingMode::LegacyTestCases(raw) => {
                self.grade_legacy(question, &request.code, raw).await?
            }
            GradingMode::ReferenceComparator(compare_code) => {
                self.grade_comparator(question, &request.code, compare_code).await?
            }
            GradingMode::DirectAnswer(answer) => {
                self.grade_direct(question, &request.code, answer).await
            }
        };

        info!(
            mode = mode.name(),
            passed = verdict.passed,
            execution_ms = verdict.execution_time_ms,
            "Grading finished"
        );

        Ok(verdict)
    }

    async fn grade_structured(
        &self,
        question: &Question,
        code: &str,
        raw: &str,
    ) -> Result<Verdict, GradingError> {
        let cases = evaluator::parse_structured(raw).map_err(GradingError::MalformedTestCases)?;
        if cases.is_empty() {
            return Err(GradingError::MissingTestCases);
        }

        let prepared: Vec<PreparedCase> = cases
            .iter()
            .map(|case| PreparedCase {
                label: evaluator::render_value(&case.input),
                stdin: evaluator::stdin_for(&case.input),
                expected: evaluator::render_value(&case.output),
            })
            .collect();

        let run = self.run_cases(question, code, &prepared).await;
        let description = if run.failure.is_none() {
            prepared
                .iter()
                .map(|case| format!("{} -> {}", case.label, case.expected))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            format!("All {} test cases must pass", prepared.len())
        };

        Ok(case_verdict(run, prepared.len(), description))
    }

    async fn grade_legacy(
        &self,
        question: &Question,
        code: &str,
        raw: &str,
    ) -> Result<Verdict, GradingError> {
        let cases = match evaluator::parse_legacy(raw) {
            Ok(cases) if !cases.is_empty() => cases,
            Ok(_) => {
                warn!("Legacy test cases empty, comparing against stored answer");
                return self.grade_stored_answer(question, code).await;
            }
            Err(e) => {
                warn!(error = %e, "Legacy test cases unreadable, comparing against stored answer");
                return self.grade_stored_answer(question, code).await;
            }
        };

        let prepared: Vec<PreparedCase> = cases
            .iter()
            .map(|case| PreparedCase {
                label: evaluator::render_value(&serde_json::Value::Array(case.input.clone())),
                stdin: evaluator::legacy_stdin(case),
                expected: evaluator::render_value(&case.output),
            })
            .collect();

        let run = self.run_cases(question, code, &prepared).await;
        let description = format!("All {} test cases must pass", prepared.len());
        Ok(case_verdict(run, prepared.len(), description))
    }

    async fn grade_stored_answer(
        &self,
        question: &Question,
        code: &str,
    ) -> Result<Verdict, GradingError> {
        let answer = question.answer.as_deref().ok_or(GradingError::MissingAnswer)?;
        Ok(self.grade_direct(question, code, answer).await)
    }

    /// Runs cases one after another; stops at the first case that does not pass
    async fn run_cases(&self, question: &Question, code: &str, cases: &[PreparedCase]) -> CaseRun {
        let mut run = CaseRun {
            last: None,
            failure: None,
            execution_time_ms: 0,
        };

        for (index, case) in cases.iter().enumerate() {
            let request = self.request(question, code, Some(case.stdin.clone()));
            let result = self.sandbox.execute(&request).await;
            run.execution_time_ms += result.execution_time_ms;

            let status = evaluator::evaluate_case(&result, &case.expected);
            debug!(
                case = index + 1,
                total = cases.len(),
                status = status.describe(),
                execution_ms = result.execution_time_ms,
                "Test case evaluated"
            );

            run.last = Some(result);
            if status != CaseStatus::Passed {
                run.failure = Some(CaseFailure {
                    index,
                    status,
                    expected: case.expected.clone(),
                });
                break;
            }
        }

        run
    }

    async fn grade_comparator(
        &self,
        question: &Question,
        code: &str,
        compare_code: &str,
    ) -> Result<Verdict, GradingError> {
        let reference = self
            .sandbox
            .execute(&self.request(question, compare_code, question.input_data.clone()))
            .await;

        if reference.timed_out {
            return Err(GradingError::ComparatorFailed(format!(
                "timed out after {} seconds",
                self.timeout_secs
            )));
        }
        if reference.exit_code != Some(0) {
            let exit = reference.exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
            return Err(GradingError::ComparatorFailed(format!(
                "exit code {}: {}",
                exit,
                reference.stderr.trim()
            )));
        }

        let expected = evaluator::normalize_output(&reference.stdout).to_string();
        let mut verdict = self.grade_direct(question, code, &expected).await;
        verdict.execution_time_ms += reference.execution_time_ms;
        Ok(verdict)
    }

    async fn grade_direct(&self, question: &Question, code: &str, answer: &str) -> Verdict {
        let result = self
            .sandbox
            .execute(&self.request(question, code, question.input_data.clone()))
            .await;

        Verdict {
            passed: !result.timed_out && evaluator::outputs_match(&result.stdout, answer),
            output: evaluator::normalize_output(&result.stdout).to_string(),
            error: result.stderr,
            expected_output: evaluator::normalize_output(answer).to_string(),
            execution_time_ms: result.execution_time_ms,
            exit_code: result.exit_code,
        }
    }

    /// Grade one submission into a persisted-shape record with a fresh id
    pub async fn process_submission(
        &self,
        question: Option<&Question>,
        request: SubmissionRequest,
    ) -> Submission {
        self.process(Uuid::new_v4(), question, request).await
    }

    /// Grade a queued job; the job id becomes the submission id
    pub async fn process_job(&self, question: Option<&Question>, job: GradingJob) -> Submission {
        self.process(job.id, question, job.request).await
    }

    /// Record a job whose question could not be loaded; nothing is executed
    pub fn reject_job(&self, job: GradingJob, reason: impl std::fmt::Display) -> Submission {
        let error = GradingError::QuestionUnavailable(reason.to_string());
        warn!(submission_id = %job.id, error = %error, "Submission failed");

        let mut submission = Submission::pending(job.id, &job.request);
        submission.fail(error.to_string());
        submission
    }

    #[instrument(
        skip(self, question, request),
        fields(submission_id = %id, question_id = %request.question_id)
    )]
    async fn process(
        &self,
        id: Uuid,
        question: Option<&Question>,
        request: SubmissionRequest,
    ) -> Submission {
        let mut submission = Submission::pending(id, &request);

        let outcome = match question {
            Some(question) => self.grade(question, &request).await,
            None => Err(GradingError::QuestionNotFound(request.question_id)),
        };

        match outcome {
            Ok(verdict) => {
                info!(score = verdict.score(), "Submission completed");
                submission.complete(verdict);
            }
            Err(e) => {
                warn!(error = %e, "Submission failed");
                submission.fail(e.to_string());
            }
        }

        submission
    }

    /// Single run without grading or persistence
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn debug(&self, request: DebugRequest) -> DebugResponse {
        let execution =
            ExecutionRequest::new(request.language, request.code, self.debug_timeout_secs)
                .with_initial_code(request.initial_code)
                .with_stdin(request.input_data);

        let result = self.sandbox.execute(&execution).await;
        DebugResponse::from_result(result, request.language)
    }

    /// Debug run using a question's initializer and input data
    pub async fn debug_question(
        &self,
        question: &Question,
        code: String,
        language: Language,
    ) -> DebugResponse {
        if question.language != language {
            let error = GradingError::LanguageMismatch {
                expected: question.language,
                submitted: language,
            };
            return DebugResponse::error(error.to_string(), language);
        }

        self.debug(DebugRequest {
            code,
            language,
            initial_code: question.initial_code.clone(),
            input_data: question.input_data.clone(),
        })
        .await
    }
}

fn case_verdict(run: CaseRun, total: usize, description: String) -> Verdict {
    let (output, exit_code) = match &run.last {
        Some(result) => (evaluator::normalize_output(&result.stdout).to_string(), result.exit_code),
        None => (String::new(), None),
    };

    let error = match (&run.failure, &run.last) {
        (Some(failure), Some(result)) => failure_message(failure, total, result),
        _ => String::new(),
    };

    Verdict {
        passed: run.failure.is_none(),
        output,
        error,
        expected_output: description,
        execution_time_ms: run.execution_time_ms,
        exit_code,
    }
}

fn failure_message(failure: &CaseFailure, total: usize, result: &ExecutionResult) -> String {
    let head = format!(
        "Test case {} of {} failed: {}",
        failure.index + 1,
        total,
        failure.status.describe()
    );

    match failure.status {
        CaseStatus::WrongAnswer => format!(
            "{} (expected '{}', got '{}')",
            head,
            failure.expected,
            evaluator::normalize_output(&result.stdout)
        ),
        CaseStatus::RuntimeError | CaseStatus::TimeLimitExceeded
            if !result.stderr.trim().is_empty() =>
        {
            format!("{}\n{}", head, result.stderr.trim())
        }
        _ => head,
    }
}
