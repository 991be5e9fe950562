//! Test fixtures and environment helpers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        if let Some(path) = host.strip_prefix("unix://") {
            return Path::new(path).exists();
        }
        return true;
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .args(["info"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
}

/// Scratch tree holding the three pipeline roots plus room for a snapshot.
///
/// Everything is removed when the layout is dropped.
pub struct TempLayout {
    _dir: TempDir,
    root: PathBuf,
    unprocessed: PathBuf,
    done: PathBuf,
    error: PathBuf,
}

impl TempLayout {
    /// Create `unprocessed/`, `done/`, and `error/` under a fresh temp dir.
    ///
    /// # Errors
    ///
    /// Returns the IO error if any directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("courier-").tempdir()?;
        let root = fs::canonicalize(dir.path())?;
        let unprocessed = root.join("unprocessed");
        let done = root.join("done");
        let error = root.join("error");
        for path in [&unprocessed, &done, &error] {
            fs::create_dir_all(path)?;
        }
        Ok(Self {
            _dir: dir,
            root,
            unprocessed,
            done,
            error,
        })
    }

    /// Temp dir containing the layout.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Watched inbox.
    #[must_use]
    pub fn unprocessed(&self) -> &Path {
        &self.unprocessed
    }

    /// Done archive root.
    #[must_use]
    pub fn done(&self) -> &Path {
        &self.done
    }

    /// Error archive root.
    #[must_use]
    pub fn error(&self) -> &Path {
        &self.error
    }

    /// Snapshot path inside the temp dir.
    #[must_use]
    pub fn snapshot(&self) -> PathBuf {
        self.root().join("persist.json")
    }

    /// Write `body` to `relative` under the inbox, creating parents.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be written.
    pub fn drop_file(
        &self,
        relative: impl AsRef<Path>,
        body: impl AsRef<[u8]>,
    ) -> io::Result<PathBuf> {
        let path = self.unprocessed.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        Ok(path)
    }
}

/// Every regular file under `root`, relative to it, sorted.
///
/// # Errors
///
/// Returns the IO error if a directory cannot be read.
pub fn files_under(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                found.push(relative.to_path_buf());
            }
        }
    }
    found.sort();
    Ok(found)
}
