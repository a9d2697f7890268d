// CLI commands: local sandbox runs, local grading and queue access
use anyhow::{bail, Context, Result};
use codegrade_common::redis;
use codegrade_common::types::{DebugRequest, GradingJob, Language, Question, SubmissionRequest};
use codegrade_engine::{Grader, LanguageRegistry, SandboxLauncher};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_question(path: &Path) -> Result<Question> {
    let content = read_text(path)?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse question {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local_grader(languages_config: &Path) -> Result<Grader<SandboxLauncher>> {
    let registry = LanguageRegistry::load_or_builtin(languages_config)?;
    let launcher = SandboxLauncher::docker(Arc::new(registry))?;
    Ok(Grader::new(launcher))
}

async fn connect(redis_url: &str) -> Result<::redis::aio::ConnectionManager> {
    let client = ::redis::Client::open(redis_url).context("Invalid Redis URL")?;
    ::redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// Build the submission for a question, defaulting to the question's language
fn submission_for(
    question: &Question,
    code: String,
    language: Option<Language>,
) -> SubmissionRequest {
    SubmissionRequest {
        question_id: question.id,
        code,
        language: language.unwrap_or(question.language),
    }
}

/// Run a file once, like the debug entry point
pub async fn run(
    languages_config: &Path,
    language: Language,
    file: &Path,
    input: Option<&Path>,
    init: Option<&Path>,
    timeout: Option<u64>,
) -> Result<()> {
    let request = DebugRequest {
        code: read_text(file)?,
        language,
        initial_code: init.map(read_text).transpose()?,
        input_data: input.map(read_text).transpose()?,
    };

    let mut grader = local_grader(languages_config)?;
    if let Some(timeout) = timeout {
        if timeout == 0 {
            bail!("Timeout must be at least 1 second");
        }
        grader = grader.with_timeouts(timeout, timeout);
    }

    let response = grader.debug(request).await;
    print_json(&response)
}

/// Grade a file locally against a question definition
pub async fn grade(
    languages_config: &Path,
    question_path: &Path,
    file: &Path,
    language: Option<Language>,
) -> Result<()> {
    let question = load_question(question_path)?;
    let request = submission_for(&question, read_text(file)?, language);

    let grader = local_grader(languages_config)?;
    let submission = grader.process_submission(Some(&question), request).await;
    print_json(&submission)
}

/// Store the question and queue the submission for a worker
pub async fn submit(
    redis_url: &str,
    question_path: &Path,
    file: &Path,
    language: Option<Language>,
) -> Result<()> {
    let question = load_question(question_path)?;
    let job = GradingJob {
        id: Uuid::new_v4(),
        request: submission_for(&question, read_text(file)?, language),
    };

    let mut conn = connect(redis_url).await?;
    redis::store_question(&mut conn, &question)
        .await
        .context("Failed to store question")?;
    redis::push_job(&mut conn, &job)
        .await
        .context("Failed to queue submission")?;

    println!("Queued submission {}", job.id);
    println!("Check it with: codegrade-cli status --id {}", job.id);
    Ok(())
}

pub async fn status(redis_url: &str, submission_id: &Uuid) -> Result<()> {
    let mut conn = connect(redis_url).await?;
    match redis::get_submission(&mut conn, submission_id)
        .await
        .context("Failed to read submission")?
    {
        Some(submission) => print_json(&submission),
        None => bail!("No graded submission {} (still queued, or expired)", submission_id),
    }
}

pub fn list_languages(languages_config: &Path) -> Result<()> {
    let registry = LanguageRegistry::load_or_builtin(languages_config)?;

    println!("{:<12} {:<28} {:<12} {}", "Language", "Image", "File", "Command");
    println!("{}", "─".repeat(90));

    for language in Language::ALL {
        let profile = registry.profile_for(language);
        let marker = if registry.is_registered(language) { "" } else { " (fallback)" };
        println!(
            "{:<12} {:<28} {:<12} {}{}",
            language.to_string(),
            profile.image,
            profile.file_name,
            profile.run_command.join(" "),
            marker
        );
    }

    println!("\nTotal: {} registered language(s)", registry.languages().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUESTION: &str = r#"{
        "id": "6f1c2a8e-8a43-4d1e-9d59-0c0d4f3b7a11",
        "language": "PYTHON",
        "answer": "2"
    }"#;

    #[test]
    fn test_load_question_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.json");
        fs::write(&path, QUESTION).unwrap();

        let question = load_question(&path).unwrap();
        assert_eq!(question.language, Language::Python);
        assert_eq!(question.answer.as_deref(), Some("2"));
    }

    #[test]
    fn test_load_question_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{").unwrap();

        let err = load_question(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }

    #[test]
    fn test_submission_defaults_to_question_language() {
        let question: Question = serde_json::from_str(QUESTION).unwrap();

        let request = submission_for(&question, "print(2)".into(), None);
        assert_eq!(request.language, Language::Python);
        assert_eq!(request.question_id, question.id);

        let request = submission_for(&question, "print(2)".into(), Some(Language::Java));
        assert_eq!(request.language, Language::Java);
    }
}
