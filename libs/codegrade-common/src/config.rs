/// Engine Configuration - Limits + Environment → Typed Settings
///
/// **Core Responsibility:**
/// Fixed sandbox limits shared by every launch, plus the worker settings
/// read from the environment with defaults for local runs.

use std::path::PathBuf;

/// Memory ceiling for every sandboxed launch
pub const MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;

/// CPU ceiling for every sandboxed launch, in nano-CPUs (1 core)
pub const CPU_LIMIT_NANO: i64 = 1_000_000_000;

/// Wall-clock timeout for graded submissions
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Wall-clock timeout for debug runs
pub const DEBUG_TIMEOUT_SECS: u64 = 15;

/// Safety limits to prevent pathological inputs from reaching Docker
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/code-execution";
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Worker configuration, read from the environment
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub languages_config: PathBuf,
    pub workspace_root: PathBuf,
    pub concurrency: usize,
    pub json_logs: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so defaults can be tested without
    /// touching the process environment
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let concurrency = lookup("WORKER_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WORKER_CONCURRENCY);

        Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            languages_config: lookup("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LANGUAGES_CONFIG)),
            workspace_root: lookup("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_ROOT)),
            concurrency,
            json_logs: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/code-execution"));
        assert_eq!(config.concurrency, 4);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("REDIS_URL", "redis://cache:6379"),
            ("WORKER_CONCURRENCY", "8"),
            ("LOG_FORMAT", "JSON"),
            ("WORKSPACE_ROOT", "/var/tmp/runs"),
        ]
        .into_iter()
        .collect();

        let config = WorkerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.concurrency, 8);
        assert!(config.json_logs);
        assert_eq!(config.workspace_root, PathBuf::from("/var/tmp/runs"));
    }

    #[test]
    fn test_invalid_concurrency_falls_back() {
        let config = WorkerConfig::from_lookup(|k| {
            (k == "WORKER_CONCURRENCY").then(|| "0".to_string())
        });
        assert_eq!(config.concurrency, DEFAULT_WORKER_CONCURRENCY);
    }
}
