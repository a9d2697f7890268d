/// Run-scoped working directory
///
/// Every launch gets `<root>/<execution-id>`, bind-mounted into the sandbox
/// and removed recursively when the `Workspace` is dropped. Dropping happens on
/// every exit path of the launcher, including timeouts and cancelled futures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Workspace {
    execution_id: Uuid,
    dir: PathBuf,
    tempdir: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh directory under `root`, named by a new execution id
    ///
    /// The root is created when missing and canonicalized, since Docker only
    /// accepts absolute host paths for bind mounts.
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;

        let execution_id = Uuid::new_v4();
        let tempdir = tempfile::Builder::new()
            .prefix(&execution_id.to_string())
            .rand_bytes(0)
            .tempdir_in(&root)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create workspace under {}: {}", root.display(), e),
                )
            })?;
        let dir = tempdir.path().to_path_buf();

        debug!(execution_id = %execution_id, dir = %dir.display(), "Workspace created");
        Ok(Self {
            execution_id,
            dir,
            tempdir: Some(tempdir),
        })
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn create_empty(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        fs::File::create(&path)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(tempdir) = self.tempdir.take() else {
            return;
        };

        match tempdir.close() {
            Ok(()) => debug!(execution_id = %self.execution_id, "Workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                execution_id = %self.execution_id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert_ne!(a.execution_id(), b.execution_id());
        assert!(a.path().is_absolute());
    }

    #[test]
    fn test_drop_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let dir = workspace.path().to_path_buf();

        workspace.write_file("main.py", "print(1)").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/out.bin"), b"\x00\x01").unwrap();

        drop(workspace);
        assert!(!dir.exists());
    }

    #[test]
    fn test_create_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let workspace = Workspace::create(&nested).unwrap();
        assert!(workspace.path().starts_with(fs::canonicalize(&nested).unwrap()));
    }

    #[test]
    fn test_directory_named_by_execution_id() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();

        let name = workspace.path().file_name().unwrap().to_str().unwrap();
        assert_eq!(name, workspace.execution_id().to_string());
        assert_eq!(workspace.path().parent().unwrap(), fs::canonicalize(root.path()).unwrap());
    }

    #[test]
    fn test_drop_tolerates_removed_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        fs::remove_dir_all(workspace.path()).unwrap();

        drop(workspace);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_create_empty_file() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let db = workspace.create_empty("app.db").unwrap();
        assert_eq!(fs::metadata(db).unwrap().len(), 0);
    }
}
