//! Snapshots of the watched tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{FsOpsError, FsOpsResult};

/// Whether the entry name starts with a dot.
#[must_use]
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn visible(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !is_hidden(entry.path())
}

/// Every regular file under `root`, sorted by name at each level, skipping
/// hidden entries at any depth.
///
/// Entries that vanish or cannot be read mid-walk are skipped.
///
/// # Errors
///
/// Returns [`FsOpsError::Walkdir`] when `root` itself cannot be read.
pub fn list_files(root: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(visible)
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) if err.depth() == 0 => {
                return Err(FsOpsError::walkdir("list_files.walk", root, err));
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
            }
        }
    }
    Ok(files)
}

/// Every regular file already present under a newly created directory.
#[must_use]
pub fn enumerate_subtree(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .collect()
}

/// Remove the directories a pass emptied: for each vacated file, climb from
/// its parent toward `root`, removing directories while they are empty.
/// `root` itself, hidden directories and directories no vacated file lived in
/// are left alone.
///
/// Returns how many directories were removed.
///
/// # Errors
///
/// Returns [`FsOpsError::Io`] when removal fails for a reason other than the
/// directory having been refilled or removed concurrently.
pub fn prune_emptied_dirs(root: &Path, vacated: &[PathBuf]) -> FsOpsResult<usize> {
    let mut removed = 0;
    for file in vacated {
        let mut current = file.parent();
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) || is_hidden(dir) {
                break;
            }
            match fs::remove_dir(dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "pruned emptied directory");
                    removed += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::DirectoryNotEmpty | io::ErrorKind::AlreadyExists
                    ) =>
                {
                    break;
                }
                Err(err) => return Err(FsOpsError::io("prune.remove_dir", dir, err)),
            }
            current = dir.parent();
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn touch(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, b"x")?;
        Ok(())
    }

    #[test]
    fn listing_is_sorted_recursive_and_skips_hidden() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        touch(&root.join("b.jpg"))?;
        touch(&root.join("a.jpg"))?;
        touch(&root.join(".DS_Store"))?;
        touch(&root.join("tray").join("c.jpg"))?;
        touch(&root.join("tray").join(".hidden.jpg"))?;
        touch(&root.join(".cache").join("d.jpg"))?;

        let files = list_files(root)?;
        assert_eq!(
            files,
            vec![
                root.join("a.jpg"),
                root.join("b.jpg"),
                root.join("tray").join("c.jpg"),
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() -> Result<()> {
        let temp = TempDir::new()?;
        assert!(matches!(
            list_files(&temp.path().join("gone")),
            Err(FsOpsError::Walkdir { .. })
        ));
        Ok(())
    }

    #[test]
    fn subtree_enumeration_finds_nested_files() -> Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("drop");
        touch(&dir.join("one.png"))?;
        touch(&dir.join("inner").join("two.png"))?;
        let found = enumerate_subtree(&dir);
        assert_eq!(
            found,
            vec![dir.join("inner").join("two.png"), dir.join("one.png")]
        );
        Ok(())
    }

    #[test]
    fn prune_climbs_only_from_vacated_files() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        let vacated = root.join("tray").join("deeper").join("scan.jpg");
        fs::create_dir_all(root.join("tray").join("deeper"))?;
        fs::create_dir_all(root.join("bench-7-drop"))?;
        touch(&root.join("kept").join("file.jpg"))?;
        let sibling = root.join("kept").join("gone.jpg");

        let removed = prune_emptied_dirs(root, &[vacated, sibling])?;

        assert_eq!(removed, 2);
        assert!(!root.join("tray").exists());
        assert!(root.join("bench-7-drop").is_dir());
        assert!(root.join("kept").join("file.jpg").is_file());
        assert!(root.is_dir());
        Ok(())
    }

    #[test]
    fn prune_stops_at_hidden_content_and_the_root() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        fs::create_dir_all(root.join("tray").join(".staging"))?;
        let vacated = vec![root.join("tray").join("scan.jpg"), root.join("top.jpg")];

        assert_eq!(prune_emptied_dirs(root, &vacated)?, 0);
        assert!(root.join("tray").join(".staging").is_dir());
        assert!(root.is_dir());
        Ok(())
    }
}
