/// Test Doubles - Scripted Runtime + Closure Sandbox
///
/// **Core Responsibility:**
/// Stand-ins for the container runtime and sandbox seams so launcher and
/// grader logic run without a Docker daemon.

use crate::runtime::{ContainerRuntime, ContainerSpec, RunOutcome};
use crate::sandbox::Sandbox;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use codegrade_common::types::{ExecutionRequest, ExecutionResult};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded container launch, with the workspace files as they were at launch
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub spec: ContainerSpec,
    pub timeout: Duration,
    pub files: HashMap<String, String>,
}

/// Runtime that replays queued outcomes in order
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    outcomes: Arc<Mutex<VecDeque<Result<RunOutcome, String>>>>,
    calls: Arc<Mutex<Vec<RecordedRun>>>,
}

impl ScriptedRuntime {
    pub fn new(outcomes: Vec<Result<RunOutcome, String>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn exited(stdout: &str, stderr: &str, code: i64) -> Result<RunOutcome, String> {
        Ok(RunOutcome {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
            timed_out: false,
            elapsed: Duration::from_millis(25),
        })
    }

    pub fn timed_out(elapsed_ms: u64) -> Result<RunOutcome, String> {
        Ok(RunOutcome {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
            elapsed: Duration::from_millis(elapsed_ms),
        })
    }

    pub fn failed(message: &str) -> Result<RunOutcome, String> {
        Err(message.to_string())
    }

    pub fn calls(&self) -> Vec<RecordedRun> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run(&self, spec: &ContainerSpec, timeout: Duration) -> Result<RunOutcome> {
        let mut files = HashMap::new();
        if let Ok(entries) = fs::read_dir(&spec.host_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                files.insert(name, fs::read_to_string(entry.path()).unwrap_or_default());
            }
        }

        self.calls.lock().unwrap().push(RecordedRun {
            spec: spec.clone(),
            timeout,
            files,
        });

        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted outcome left")),
        }
    }
}

type Responder = dyn Fn(&ExecutionRequest) -> ExecutionResult + Send + Sync;

/// Sandbox answering every request through a closure
#[derive(Clone)]
pub struct FnSandbox {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<ExecutionRequest>>>,
}

impl FnSandbox {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ExecutionRequest) -> ExecutionResult + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for FnSandbox {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

pub fn ok(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        execution_time_ms: 10,
        exit_code: Some(0),
        timed_out: false,
    }
}

pub fn exited(stdout: &str, stderr: &str, code: i64) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        execution_time_ms: 10,
        exit_code: Some(code),
        timed_out: false,
    }
}
