/// Container Runtime - launch seam between the launcher and Docker
///
/// **Core Responsibility:**
/// Run one argv inside one fresh container with the workspace mounted and
/// report raw stdout/stderr/exit code, or a timeout.
///
/// **Boundary:**
/// - Runtime knows HOW to launch (images, limits, kill on deadline)
/// - Runtime does NOT know languages, stdin files or grading
/// - `Err` means the container could not be pulled, created or started
///
/// Production uses `DockerRuntime`; tests substitute scripted runtimes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use codegrade_common::config::{CPU_LIMIT_NANO, MEMORY_LIMIT_BYTES};
use futures_util::stream::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Mount point of the workspace inside every container
pub const MOUNT_TARGET: &str = "/code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub network_disabled: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: MEMORY_LIMIT_BYTES,
            nano_cpus: CPU_LIMIT_NANO,
            network_disabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// Host directory bind-mounted read/write at `MOUNT_TARGET`
    pub host_dir: PathBuf,
    pub limits: ResourceLimits,
}

impl ContainerSpec {
    pub fn bind(&self) -> String {
        format!("{}:{}:rw", self.host_dir.display(), MOUNT_TARGET)
    }
}

/// Raw result of one container run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(&self, spec: &ContainerSpec, timeout: Duration) -> Result<RunOutcome>;
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        // Drop cannot be async; hand the removal to the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

/// Docker-based runtime
///
/// **Docker Execution Rules:**
/// 1. Pulls the image if not present
/// 2. Creates the container with network disabled, memory and CPU ceilings,
///    and the workspace bind-mounted at `/code`
/// 3. Drains stdout/stderr fully, then reads the exit code
/// 4. Kills the container when the deadline passes
/// 5. Removes the container on every path
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    /// Collect logs until the stream closes, then wait for the exit code
    async fn collect(&self, container_id: &str) -> (String, String, Option<i64>) {
        let mut stdout = String::new();
        let mut stderr = String::new();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs = self.docker.logs(container_id, logs_options);
        while let Some(output) = logs.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container_id = %container_id, error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = Some(WaitContainerOptions {
            condition: "not-running",
        });

        let mut wait = self.docker.wait_container(container_id, wait_options);
        let exit_code = match wait.next().await {
            Some(Ok(response)) => Some(response.status_code),
            // bollard reports non-zero exits as a wait error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(e)) => {
                warn!(
                    container_id = %container_id,
                    error = %e,
                    "Failed to get container exit code"
                );
                None
            }
            None => {
                warn!(container_id = %container_id, "No wait response from container");
                None
            }
        };

        (stdout, stderr, exit_code)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &ContainerSpec, timeout: Duration) -> Result<RunOutcome> {
        self.ensure_image(&spec.image).await.with_context(|| {
            format!("Failed to ensure Docker image '{}' is available", spec.image)
        })?;

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: Some(MOUNT_TARGET.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(spec.limits.network_disabled),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(spec.limits.memory_bytes),
                memory_swap: Some(spec.limits.memory_bytes),
                nano_cpus: Some(spec.limits.nano_cpus),
                network_mode: spec.limits.network_disabled.then(|| "none".to_string()),
                binds: Some(vec![spec.bind()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let start_time = Instant::now();

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        match tokio::time::timeout(timeout, self.collect(&container_id)).await {
            Ok((stdout, mut stderr, exit_code)) => {
                match exit_code {
                    Some(137) => {
                        stderr.push_str("\n[Container killed: likely OOM or exceeded memory limit]")
                    }
                    Some(139) => stderr.push_str("\n[Container killed: segmentation fault]"),
                    _ => {}
                }

                debug!(
                    container = %spec.name,
                    exit_code = ?exit_code,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Container finished"
                );

                Ok(RunOutcome {
                    stdout,
                    stderr,
                    exit_code,
                    timed_out: false,
                    elapsed: start_time.elapsed(),
                })
            }
            Err(_) => {
                warn!(
                    container = %spec.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Execution timed out, killing container"
                );

                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container = %spec.name, error = %e, "Failed to kill timed-out container");
                }

                Ok(RunOutcome {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    timed_out: true,
                    elapsed: start_time.elapsed(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(limits.nano_cpus, 1_000_000_000);
        assert!(limits.network_disabled);
    }

    #[test]
    fn test_bind_mounts_workspace_read_write() {
        let spec = ContainerSpec {
            name: "code-exec-test".into(),
            image: "alpine:latest".into(),
            cmd: vec!["sh".into(), "-c".into(), "true".into()],
            host_dir: PathBuf::from("/tmp/code-execution/abc"),
            limits: ResourceLimits::default(),
        };
        assert_eq!(spec.bind(), "/tmp/code-execution/abc:/code:rw");
    }
}
