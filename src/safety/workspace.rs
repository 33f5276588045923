/// Scratch workspaces for subprocess back-ends.
///
/// One process-wide scratch root holds a directory per execution, named after
/// the execution's UUID. Compilers and programs run inside that directory, so
/// anything they write is removed with it and concurrent runs never share a
/// path.
use crate::config::types::{EngineError, Result};
use crate::observability::audit;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Process-wide scratch directory
#[derive(Debug, Clone)]
pub struct ScratchRoot {
    dir: PathBuf,
}

impl ScratchRoot {
    /// Create the root if absent. Safe to call repeatedly.
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Workspace(format!(
                "Failed to create scratch root {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Allocate `<root>/<id>/` for one execution
    pub fn create_workspace(&self, id: Uuid) -> Result<Workspace> {
        let dir = self.dir.join(id.to_string());
        fs::create_dir(&dir).map_err(|e| {
            EngineError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Workspace {
            id,
            dir,
            cleaned: false,
        })
    }

    /// Remove root entries older than `max_age`. Returns how many were removed.
    ///
    /// Only leftovers from crashed processes should ever match; live executions
    /// remove their own entries before returning.
    pub fn purge_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = SystemTime::now();

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            EngineError::Workspace(format!(
                "Failed to read scratch root {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read scratch entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get metadata for {}: {}", path.display(), e);
                    continue;
                }
            };
            let age = match metadata.modified().map(|m| now.duration_since(m)) {
                Ok(Ok(d)) => d,
                // Unknown or future timestamp
                _ => continue,
            };
            if age <= max_age {
                continue;
            }

            log::info!("Purging stale scratch entry: {}", path.display());
            let removed = if metadata.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => cleaned += 1,
                Err(e) => log::warn!("Failed to purge {}: {}", path.display(), e),
            }
        }

        Ok(cleaned)
    }
}

/// Directory owned by one execution. Removed on `cleanup` or drop, whichever comes first.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    cleaned: bool,
}

impl Workspace {
    /// Working directory for every command of this execution
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the submitted source under `file_name`
    pub fn write_source(&mut self, file_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        fs::write(&path, content).map_err(|e| {
            EngineError::Workspace(format!(
                "Failed to write source file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(path)
    }

    /// Path for a build artifact inside the workspace
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Remove the directory and everything in it. Idempotent, never fails:
    /// problems are logged and audited. Returns the number of paths left behind.
    pub fn cleanup(&mut self) -> usize {
        if self.cleaned {
            return 0;
        }
        self.cleaned = true;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => 0,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                log::warn!(
                    "Failed to remove workspace directory {}: {}",
                    self.dir.display(),
                    e
                );
                audit::cleanup_failed(self.id, &self.dir, &e.to_string());
                1
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("scratch");
        ScratchRoot::open(dir.clone()).unwrap();
        ScratchRoot::open(dir.clone()).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_workspace_cleanup_removes_directory() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        let mut workspace = root.create_workspace(id).unwrap();
        assert_eq!(workspace.dir(), root.path().join(id.to_string()));
        let source = workspace.write_source(&format!("{id}.c"), "int main(){}").unwrap();
        fs::write(workspace.artifact_path(&format!("{id}.out")), b"\x7fELF").unwrap();
        assert!(source.exists());

        assert_eq!(workspace.cleanup(), 0);
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_cleanup_removes_files_the_program_wrote() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();

        let mut workspace = root.create_workspace(Uuid::new_v4()).unwrap();
        workspace.write_source("Main.java", "class Main {}").unwrap();
        // javac output and program writes are never tracked
        fs::write(workspace.dir().join("Main$Inner.class"), b"").unwrap();
        fs::create_dir(workspace.dir().join("out")).unwrap();
        fs::write(workspace.dir().join("out").join("leak.txt"), b"x").unwrap();

        workspace.cleanup();
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_workspaces_are_disjoint() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        let first = root.create_workspace(Uuid::new_v4()).unwrap();
        let second = root.create_workspace(Uuid::new_v4()).unwrap();
        assert_ne!(first.dir(), second.dir());
    }

    #[test]
    fn test_drop_cleans_up() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        {
            let mut workspace = root.create_workspace(Uuid::new_v4()).unwrap();
            workspace.write_source("x.py", "print(1)").unwrap();
        }
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_cleanup_twice_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        let mut workspace = root.create_workspace(Uuid::new_v4()).unwrap();
        assert_eq!(workspace.cleanup(), 0);
        assert_eq!(workspace.cleanup(), 0);
    }

    #[test]
    fn test_purge_stale_entries() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        fs::write(root.path().join("leftover.py"), "print(1)").unwrap();
        fs::create_dir(root.path().join("leftover-dir")).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let purged = root.purge_stale(Duration::from_millis(10)).unwrap();
        assert_eq!(purged, 2);
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_purge_keeps_fresh_entries() {
        let temp = tempfile::tempdir().unwrap();
        let root = ScratchRoot::open(temp.path().to_path_buf()).unwrap();
        fs::write(root.path().join("fresh.c"), "").unwrap();

        let purged = root.purge_stale(Duration::from_secs(3600)).unwrap();
        assert_eq!(purged, 0);
        assert_eq!(entries(root.path()).len(), 1);
    }
}
