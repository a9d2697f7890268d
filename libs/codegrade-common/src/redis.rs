use crate::types::{GradingJob, Question, Submission};
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis queue semantics - defines only semantics, not runtime logic
/// Keeps producers and the grading worker agreeing on deterministic keys

pub const QUEUE_KEY: &str = "codegrade:queue";
pub const QUESTION_PREFIX: &str = "codegrade:question";
pub const SUBMISSION_PREFIX: &str = "codegrade:submission";
pub const STATUS_PREFIX: &str = "codegrade:status";

/// Stored submissions expire after 24 hours
pub const RESULT_TTL_SECS: u64 = 86400;

pub fn question_key(question_id: &Uuid) -> String {
    format!("{}:{}", QUESTION_PREFIX, question_id)
}

pub fn submission_key(submission_id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, submission_id)
}

pub fn status_key(submission_id: &Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, submission_id)
}

fn encode<T: serde::Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "serialization error",
            e.to_string(),
        ))
    })
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "deserialization error",
            e.to_string(),
        ))
    })
}

/// Push a grading job; RPUSH for FIFO semantics
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &GradingJob,
) -> RedisResult<()> {
    let payload = encode(job)?;
    conn.rpush(QUEUE_KEY, payload).await
}

/// Pop a grading job
/// Uses BLPOP with timeout for graceful shutdown
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<GradingJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(decode(&payload)?)),
        None => Ok(None),
    }
}

pub async fn store_question(
    conn: &mut redis::aio::ConnectionManager,
    question: &Question,
) -> RedisResult<()> {
    let payload = encode(question)?;
    conn.set(question_key(&question.id), payload).await
}

pub async fn get_question(
    conn: &mut redis::aio::ConnectionManager,
    question_id: &Uuid,
) -> RedisResult<Option<Question>> {
    let payload: Option<String> = conn.get(question_key(question_id)).await?;
    payload.as_deref().map(decode).transpose()
}

/// Store a graded submission and its status for quick lookup
pub async fn store_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = encode(submission)?;
    let _: () = conn
        .set_ex(submission_key(&submission.id), payload, RESULT_TTL_SECS)
        .await?;

    let status = encode(&submission.status)?;
    let _: () = conn
        .set_ex(status_key(&submission.id), status, RESULT_TTL_SECS)
        .await?;

    Ok(())
}

pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<Option<Submission>> {
    let payload: Option<String> = conn.get(submission_key(submission_id)).await?;
    payload.as_deref().map(decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_question_key_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(question_key(&id), question_key(&id));
        assert!(question_key(&id).starts_with("codegrade:question:"));
    }

    #[test]
    fn test_submission_and_status_keys() {
        let id = Uuid::new_v4();
        assert_eq!(submission_key(&id), format!("codegrade:submission:{}", id));
        assert_eq!(status_key(&id), format!("codegrade:status:{}", id));
    }

    #[test]
    fn test_decode_error_is_type_error() {
        let err = decode::<Question>("not json").unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::TypeError);
    }
}
