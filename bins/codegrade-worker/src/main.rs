use anyhow::Context;
use codegrade_common::config::WorkerConfig;
use codegrade_common::redis;
use codegrade_common::types::GradingJob;
use codegrade_engine::{Grader, LanguageRegistry, SandboxLauncher};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

type DockerGrader = Grader<SandboxLauncher>;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    init_tracing(config.json_logs);

    info!("Grading worker booting...");

    let registry = LanguageRegistry::load_or_builtin(&config.languages_config)
        .context("Failed to load language profiles")?;
    info!(languages = ?registry.languages(), "Language profiles ready");

    let launcher = SandboxLauncher::docker(Arc::new(registry))?
        .with_workspace_root(&config.workspace_root);
    let grader = Arc::new(Grader::new(launcher));

    let client = ::redis::Client::open(config.redis_url.as_str())
        .context("Invalid Redis URL")?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!(
        redis_url = %config.redis_url,
        workspace_root = %config.workspace_root.display(),
        concurrency = config.concurrency,
        "Worker configured"
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        warn!("Received shutdown signal, stopping intake...");
    };

    let permits = Arc::new(Semaphore::new(config.concurrency));

    tokio::select! {
        _ = worker_loop(redis_conn, grader, permits.clone()) => {},
        _ = shutdown => {},
    }

    // let in-flight submissions finish and persist
    let _drained = permits.acquire_many(config.concurrency as u32).await;

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip_all)]
async fn worker_loop(
    mut redis_conn: ::redis::aio::ConnectionManager,
    grader: Arc<DockerGrader>,
    permits: Arc<Semaphore>,
) {
    loop {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_job(&mut redis_conn, 5.0).await {
            Ok(Some(job)) => {
                info!(
                    submission_id = %job.id,
                    question_id = %job.request.question_id,
                    language = %job.request.language,
                    source_size = job.request.code.len(),
                    "Received job"
                );

                let conn = redis_conn.clone();
                let grader = grader.clone();
                tokio::spawn(async move {
                    handle_job(conn, &grader, job).await;
                    drop(permit);
                });
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[instrument(skip_all, fields(submission_id = %job.id))]
async fn handle_job(
    mut redis_conn: ::redis::aio::ConnectionManager,
    grader: &DockerGrader,
    job: GradingJob,
) {
    let submission = match redis::get_question(&mut redis_conn, &job.request.question_id).await {
        Ok(question) => grader.process_job(question.as_ref(), job).await,
        Err(e) => {
            error!(error = %e, "Failed to load question");
            grader.reject_job(job, e)
        }
    };

    info!(
        status = ?submission.status,
        score = submission.score,
        execution_ms = submission.execution_time_ms.unwrap_or_default(),
        "Submission graded"
    );

    match redis::store_submission(&mut redis_conn, &submission).await {
        Ok(()) => info!("Submission persisted to Redis"),
        // Non-fatal - worker continues
        Err(e) => error!(error = %e, "Failed to persist submission"),
    }
}
