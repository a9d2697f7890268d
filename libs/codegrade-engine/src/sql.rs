/// SQL Execution Path - Initializer + Query → One Result
///
/// **Core Responsibility:**
/// Two ordered sandbox runs against one SQLite file kept in the workspace:
/// the initializer (schema/data) first, then the submitted query.

use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::sandbox::SandboxLauncher;
use crate::workspace::Workspace;
use codegrade_common::types::{
    ExecutionRequest, ExecutionResult, Language, INFRASTRUCTURE_EXIT_CODE,
};
use tracing::{info, warn};

pub const DATABASE_FILE: &str = "app.db";
pub const INIT_SCRIPT: &str = "init.sql";
pub const QUERY_SCRIPT: &str = "query.sql";

impl<R: ContainerRuntime> SandboxLauncher<R> {
    fn sql_spec(&self, workspace: &Workspace, phase: &str, script: &str) -> ContainerSpec {
        let profile = self.registry.profile_for(Language::Sql);

        let mut cmd = profile.run_command.clone();
        cmd.push(".mode column".to_string());
        cmd.push(".headers on".to_string());
        cmd.push(format!(".read {}", script));

        ContainerSpec {
            name: format!("sql-exec-{}-{}", workspace.execution_id(), phase),
            image: profile.image.clone(),
            cmd,
            host_dir: workspace.path().to_path_buf(),
            limits: self.limits,
        }
    }

    pub(crate) async fn execute_sql(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        if let Err(e) = workspace.create_empty(DATABASE_FILE) {
            return ExecutionResult::infrastructure_failure(format!(
                "Failed to create database file: {}",
                e
            ));
        }

        let timeout_secs = request.timeout_secs;

        let initial_code = request.initial_code.as_deref().filter(|c| !c.trim().is_empty());
        if let Some(initial_code) = initial_code {
            if let Err(e) = workspace.write_file(INIT_SCRIPT, initial_code) {
                return ExecutionResult::infrastructure_failure(format!(
                    "Failed to prepare initialization script: {}",
                    e
                ));
            }

            let spec = self.sql_spec(workspace, "init", INIT_SCRIPT);
            let init = self
                .launch(&spec, timeout_secs, || "Database initialization timed out".to_string())
                .await;

            if init.timed_out {
                warn!(
                    execution_id = %workspace.execution_id(),
                    "Database initialization timed out"
                );
                return init;
            }

            if init.exit_code != Some(0) || !init.stderr.trim().is_empty() {
                warn!(
                    execution_id = %workspace.execution_id(),
                    exit_code = ?init.exit_code,
                    "Database initialization failed, skipping query"
                );
                // launcher failures already carry their own message
                if init.exit_code == Some(INFRASTRUCTURE_EXIT_CODE) {
                    return init;
                }
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("Database initialization error: {}", init.stderr),
                    execution_time_ms: init.execution_time_ms,
                    exit_code: Some(match init.exit_code {
                        Some(0) | None => 1,
                        Some(code) => code,
                    }),
                    timed_out: false,
                };
            }

            info!(
                execution_id = %workspace.execution_id(),
                execution_ms = init.execution_time_ms,
                "Database initialized"
            );
        }

        if let Err(e) = workspace.write_file(QUERY_SCRIPT, &request.source_code) {
            return ExecutionResult::infrastructure_failure(format!(
                "Failed to prepare code for execution: {}",
                e
            ));
        }

        let spec = self.sql_spec(workspace, "query", QUERY_SCRIPT);
        self.launch(&spec, timeout_secs, || {
            format!("Query execution timed out after {} seconds", timeout_secs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::language::LanguageRegistry;
    use crate::sandbox::{Sandbox, SandboxLauncher};
    use crate::testing::ScriptedRuntime;
    use codegrade_common::types::{ExecutionRequest, Language};
    use std::sync::Arc;
    use std::time::Duration;

    fn sql_request(query: &str, init: Option<&str>) -> ExecutionRequest {
        ExecutionRequest::new(Language::Sql, query, 10).with_initial_code(init.map(str::to_string))
    }

    fn launcher(
        runtime: &ScriptedRuntime,
        root: &std::path::Path,
    ) -> SandboxLauncher<ScriptedRuntime> {
        SandboxLauncher::new(runtime.clone(), Arc::new(LanguageRegistry::builtin()))
            .with_workspace_root(root)
    }

    #[tokio::test]
    async fn test_init_then_query_share_database() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![
            ScriptedRuntime::exited("", "", 0),
            ScriptedRuntime::exited("name\n----\nann\n", "", 0),
        ]);

        let result = launcher(&runtime, root.path())
            .execute(&sql_request(
                "SELECT name FROM users;",
                Some("CREATE TABLE users(name TEXT); INSERT INTO users VALUES('ann');"),
            ))
            .await;

        assert_eq!(result.stdout, "name\n----\nann\n");
        assert_eq!(result.exit_code, Some(0));

        let calls = runtime.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].spec.image, "keinos/sqlite3");
        assert_eq!(
            calls[0].spec.cmd,
            vec!["sqlite3", "app.db", ".mode column", ".headers on", ".read init.sql"]
        );
        assert_eq!(calls[1].spec.cmd.last().unwrap(), ".read query.sql");
        assert_eq!(calls[0].spec.host_dir, calls[1].spec.host_dir);
        assert_eq!(calls[0].timeout, Duration::from_secs(10));
        assert_eq!(calls[1].timeout, Duration::from_secs(10));
        assert!(calls[0].files.contains_key("app.db"));
        assert_eq!(calls[1].files["query.sql"], "SELECT name FROM users;");
    }

    #[tokio::test]
    async fn test_init_error_skips_query_phase() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![
            ScriptedRuntime::exited("", "Error: near line 1: no such table: missing", 1),
            ScriptedRuntime::exited("marker", "", 0),
        ]);

        let result = launcher(&runtime, root.path())
            .execute(&sql_request(
                "INSERT INTO audit VALUES('marker');",
                Some("INSERT INTO missing VALUES(1);"),
            ))
            .await;

        assert_eq!(runtime.calls().len(), 1, "query phase must not run");
        assert!(result.stderr.starts_with("Database initialization error: "));
        assert!(result.stderr.contains("no such table"));
        assert_eq!(result.exit_code, Some(1));
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_init_stderr_with_zero_exit_still_fails() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![ScriptedRuntime::exited("", "Parse error", 0)]);

        let result = launcher(&runtime, root.path())
            .execute(&sql_request("SELECT 1;", Some("CREAT TABLE t(x);")))
            .await;

        assert_eq!(runtime.calls().len(), 1);
        assert_eq!(result.exit_code, Some(1));
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_init_timeout_propagates() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![ScriptedRuntime::timed_out(10_000)]);

        let endless = "WITH RECURSIVE r(x) AS (SELECT 1 UNION ALL SELECT x FROM r) \
                       SELECT * FROM r;";
        let result = launcher(&runtime, root.path())
            .execute(&sql_request("SELECT 1;", Some(endless)))
            .await;

        assert_eq!(runtime.calls().len(), 1);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.stderr, "Database initialization timed out");
    }

    #[tokio::test]
    async fn test_query_without_initializer_runs_once() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![ScriptedRuntime::exited("1\n", "", 0)]);

        let result = launcher(&runtime, root.path())
            .execute(&sql_request("SELECT 1;", Some("   ")))
            .await;

        let calls = runtime.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].spec.name.ends_with("-query"));
        assert!(!calls[0].files.contains_key("init.sql"));
        assert_eq!(result.stdout, "1\n");
    }

    #[tokio::test]
    async fn test_query_timeout_message() {
        let root = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new(vec![ScriptedRuntime::timed_out(10_000)]);

        let result = launcher(&runtime, root.path())
            .execute(&sql_request("SELECT 1;", None))
            .await;

        assert!(result.timed_out);
        assert_eq!(result.stderr, "Query execution timed out after 10 seconds");
    }
}
