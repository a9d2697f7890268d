/// Sandbox Launcher - one request in, exactly one `ExecutionResult` out
///
/// **Core Responsibility:**
/// Prepare a disposable workspace, write the source (and stdin sidecar),
/// launch the language's run command under fixed resource limits and map the
/// outcome onto an `ExecutionResult`.
///
/// **Failure Semantics:**
/// - Program failures (compile errors, crashes, non-zero exits) are ordinary results
/// - Timeouts set `timed_out` and leave the exit code empty
/// - Infrastructure failures (workspace, files, Docker) become exit code -1
///   with a descriptive stderr; nothing is raised past this boundary

use crate::language::{LanguageRegistry, INPUT_FILE};
use crate::runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, ResourceLimits, RunOutcome};
use crate::workspace::Workspace;
use async_trait::async_trait;
use codegrade_common::config::{DEFAULT_WORKSPACE_ROOT, MAX_SOURCE_CODE_BYTES, MAX_STDIN_BYTES};
use codegrade_common::types::{ExecutionRequest, ExecutionResult, Language};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult;
}

pub struct SandboxLauncher<R: ContainerRuntime = DockerRuntime> {
    pub(crate) runtime: R,
    pub(crate) registry: Arc<LanguageRegistry>,
    workspace_root: PathBuf,
    pub(crate) limits: ResourceLimits,
}

impl SandboxLauncher<DockerRuntime> {
    /// Launcher backed by the local Docker daemon
    pub fn docker(registry: Arc<LanguageRegistry>) -> anyhow::Result<Self> {
        Ok(Self::new(DockerRuntime::connect()?, registry))
    }
}

impl<R: ContainerRuntime> SandboxLauncher<R> {
    pub fn new(runtime: R, registry: Arc<LanguageRegistry>) -> Self {
        Self {
            runtime,
            registry,
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Run a prepared spec and map the raw outcome onto a result
    pub(crate) async fn launch(
        &self,
        spec: &ContainerSpec,
        timeout_secs: u64,
        timeout_message: impl FnOnce() -> String,
    ) -> ExecutionResult {
        match self.runtime.run(spec, Duration::from_secs(timeout_secs)).await {
            Ok(outcome) => into_result(outcome, timeout_message),
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(container = %spec.name, error = %message, "Sandbox launch failed");
                let error = format!("Internal execution error: {}", message);
                ExecutionResult::infrastructure_failure(error)
            }
        }
    }

    async fn execute_in(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        let profile = self.registry.profile_for(request.language);
        let has_input = request.has_stdin();

        if has_input {
            let stdin = request.stdin.as_deref().unwrap_or_default();
            if let Err(e) = workspace.write_file(INPUT_FILE, stdin) {
                return ExecutionResult::infrastructure_failure(format!(
                    "Failed to prepare input data: {}",
                    e
                ));
            }
        }

        let source = profile.prepare_source(&request.source_code, has_input);
        if let Err(e) = workspace.write_file(&profile.file_name, &source) {
            return ExecutionResult::infrastructure_failure(format!(
                "Failed to prepare code for execution: {}",
                e
            ));
        }

        let command = profile.shell_command(has_input);
        debug!(image = %profile.image, command = %command, "Launching sandbox");

        let spec = ContainerSpec {
            name: format!("code-exec-{}", workspace.execution_id()),
            image: profile.image.clone(),
            cmd: vec!["sh".to_string(), "-c".to_string(), command],
            host_dir: workspace.path().to_path_buf(),
            limits: self.limits,
        };

        let timeout_secs = request.timeout_secs;
        self.launch(&spec, timeout_secs, || {
            format!("Execution timed out after {} seconds", timeout_secs)
        })
        .await
    }
}

pub(crate) fn into_result(
    outcome: RunOutcome,
    timeout_message: impl FnOnce() -> String,
) -> ExecutionResult {
    if outcome.timed_out {
        return ExecutionResult::timed_out(outcome.elapsed_ms(), timeout_message());
    }

    ExecutionResult {
        execution_time_ms: outcome.elapsed_ms(),
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
        timed_out: false,
    }
}

fn check_sizes(request: &ExecutionRequest) -> Result<(), String> {
    if request.source_code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(format!(
            "Source code exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        ));
    }
    if request.stdin.as_ref().is_some_and(|s| s.len() > MAX_STDIN_BYTES) {
        return Err(format!("Input data exceeds maximum size of {} bytes", MAX_STDIN_BYTES));
    }
    Ok(())
}

#[async_trait]
impl<R: ContainerRuntime> Sandbox for SandboxLauncher<R> {
    #[instrument(
        skip(self, request),
        fields(language = %request.language, timeout_secs = request.timeout_secs)
    )]
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        if let Err(message) = check_sizes(request) {
            return ExecutionResult::infrastructure_failure(message);
        }

        let workspace = match Workspace::create(&self.workspace_root) {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "Failed to create workspace");
                return ExecutionResult::infrastructure_failure(format!(
                    "Failed to create execution environment: {}",
                    e
                ));
            }
        };

        let execution_id = workspace.execution_id();
        info!(execution_id = %execution_id, has_input = request.has_stdin(), "Execution started");

        let result = if request.language == Language::Sql {
            self.execute_sql(&workspace, request).await
        } else {
            self.execute_in(&workspace, request).await
        };

        info!(
            execution_id = %execution_id,
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            execution_ms = result.execution_time_ms,
            "Execution finished"
        );

        result
        // workspace dropped here: directory removed on every path
    }
}
