//! Parallel-path computation and collision-safe relocation.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};

/// Highest `" (k)"` suffix tried before a relocation gives up.
pub const DEFAULT_COLLISION_LIMIT: u32 = 9_999;

/// Local calendar date used for date-partitioned archive folders.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Inputs for relocating one file into an archive root.
#[derive(Debug, Clone, Copy)]
pub struct RelocateRequest<'a> {
    /// File to move.
    pub source: &'a Path,
    /// Archive root receiving the file.
    pub destination_root: &'a Path,
    /// Base the source's relative suffix is computed against.
    pub preserve_relative_to: &'a Path,
    /// Partition folder inserted under the root, if any.
    pub date_subdir: Option<NaiveDate>,
}

/// Moves files into archive roots without overwriting anything.
#[derive(Debug, Clone, Copy)]
pub struct Mover {
    collision_limit: u32,
}

impl Default for Mover {
    fn default() -> Self {
        Self::new()
    }
}

impl Mover {
    /// Mover using [`DEFAULT_COLLISION_LIMIT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            collision_limit: DEFAULT_COLLISION_LIMIT,
        }
    }

    /// Mover with a custom cap on disambiguator suffixes (at least one).
    #[must_use]
    pub fn with_collision_limit(limit: u32) -> Self {
        Self {
            collision_limit: limit.max(1),
        }
    }

    /// Target path mirroring `source`'s position under `preserve_relative_to`,
    /// rooted at `destination_root[/YYYY-MM-DD]`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidInput`] when `source` does not live under
    /// `preserve_relative_to` or has no file name.
    pub fn parallel_path(request: &RelocateRequest<'_>) -> FsOpsResult<PathBuf> {
        let relative = request
            .source
            .strip_prefix(request.preserve_relative_to)
            .map_err(|_| FsOpsError::InvalidInput {
                field: "source",
                reason: "outside_base",
                value: Some(request.source.display().to_string()),
            })?;
        if relative.file_name().is_none() {
            return Err(FsOpsError::InvalidInput {
                field: "source",
                reason: "no_file_name",
                value: Some(request.source.display().to_string()),
            });
        }

        let mut target = request.destination_root.to_path_buf();
        if let Some(date) = request.date_subdir {
            target.push(date.format("%Y-%m-%d").to_string());
        }
        target.push(relative);
        Ok(target)
    }

    /// Relocate the source to its parallel path, disambiguating on collision.
    ///
    /// Returns the final path. The source no longer exists on success. An
    /// existing file is never replaced: a name claimed between the probe and
    /// the move sends the search on to the next suffix.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::CollisionLimit`] when every suffix up to the cap
    /// is taken, and [`FsOpsError::Io`] for filesystem failures.
    pub fn relocate(&self, request: &RelocateRequest<'_>) -> FsOpsResult<PathBuf> {
        let target = Self::parallel_path(request)?;
        ensure_parent(&target)?;
        let candidates = std::iter::once(target.clone()).chain(
            (1..=self.collision_limit).map(|index| with_suffix(&target, &index.to_string())),
        );
        for candidate in candidates {
            if occupied(&candidate)? {
                continue;
            }
            if place_file(request.source, &candidate)? == Placement::Taken {
                debug!(target = %candidate.display(), "name claimed concurrently; trying next");
                continue;
            }
            debug!(
                source = %request.source.display(),
                target = %candidate.display(),
                "file relocated"
            );
            return Ok(candidate);
        }
        Err(FsOpsError::CollisionLimit {
            path: target,
            limit: self.collision_limit,
        })
    }

    /// Relocate under a `name (<uuid>).ext` suffix, skipping the bounded search.
    ///
    /// Used when the collision search of a root is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] for filesystem failures.
    pub fn relocate_forced(request: &RelocateRequest<'_>) -> FsOpsResult<PathBuf> {
        let target = Self::parallel_path(request)?;
        ensure_parent(&target)?;
        let forced = with_suffix(&target, &Uuid::new_v4().to_string());
        if place_file(request.source, &forced)? == Placement::Taken {
            return Err(FsOpsError::io(
                "relocate.forced",
                &forced,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        warn!(
            source = %request.source.display(),
            target = %forced.display(),
            "file relocated under forced suffix"
        );
        Ok(forced)
    }
}

/// `dir/stem (suffix).ext`, or `dir/name (suffix)` when there is no extension.
fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let stem = target
        .file_stem()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    let mut name = stem;
    name.push(format!(" ({suffix})"));
    if let Some(extension) = target.extension() {
        name.push(".");
        name.push(extension);
    }
    target.with_file_name(name)
}

fn occupied(path: &Path) -> FsOpsResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(FsOpsError::io("relocate.probe", path, err)),
    }
}

fn ensure_parent(target: &Path) -> FsOpsResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| FsOpsError::io("relocate.create_parent", parent, err))?;
    }
    Ok(())
}

/// Whether a placement landed or found the name already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Placed,
    Taken,
}

/// Move `source` to `target` without replacing an existing `target`.
///
/// Links the source under the new name and then unlinks the old one. Across
/// devices the content is copied instead. Filesystems without hard links get a
/// plain rename, which relies on no other writer in the archive roots.
fn place_file(source: &Path, target: &Path) -> FsOpsResult<Placement> {
    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(FsOpsError::io("relocate.remove_source", source, err));
            }
            Ok(Placement::Placed)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(Placement::Taken),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                source = %source.display(),
                target = %target.display(),
                "link crosses devices; copying"
            );
            copy_then_remove(source, target)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(FsOpsError::io("relocate.link", source, err))
        }
        Err(err) => {
            debug!(error = %err, "hard links unavailable; renaming");
            match fs::rename(source, target) {
                Ok(()) => Ok(Placement::Placed),
                Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                    copy_then_remove(source, target)
                }
                Err(err) => Err(FsOpsError::io("relocate.rename", source, err)),
            }
        }
    }
}

/// Copy into a hidden temp file beside the target, link it into place, then
/// remove the source. A failed source removal rolls the copy back.
fn copy_then_remove(source: &Path, target: &Path) -> FsOpsResult<Placement> {
    let staging = target.with_file_name(format!(".courier-{}.partial", Uuid::new_v4()));
    if let Err(err) = fs::copy(source, &staging) {
        let _ = fs::remove_file(&staging);
        return Err(FsOpsError::io("relocate.copy", &staging, err));
    }
    let promoted = match fs::hard_link(&staging, target) {
        Ok(()) => Ok(Placement::Placed),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(Placement::Taken),
        Err(_) => fs::rename(&staging, target)
            .map(|()| Placement::Placed)
            .map_err(|err| FsOpsError::io("relocate.promote", target, err)),
    };
    let _ = fs::remove_file(&staging);
    if promoted? == Placement::Taken {
        return Ok(Placement::Taken);
    }
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(FsOpsError::io("relocate.remove_source", source, err));
    }
    Ok(Placement::Placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    type TestResult<T> = Result<T>;

    fn layout() -> TestResult<(TempDir, PathBuf, PathBuf)> {
        let temp = TempDir::new()?;
        let inbox = temp.path().join("unprocessed");
        let done = temp.path().join("done");
        fs::create_dir_all(&inbox)?;
        fs::create_dir_all(&done)?;
        Ok((temp, inbox, done))
    }

    #[test]
    fn parallel_path_mirrors_relative_structure_under_date() -> TestResult<()> {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).ok_or_else(|| anyhow::anyhow!("date"))?;
        let request = RelocateRequest {
            source: Path::new("/in/tray-4/img.jpg"),
            destination_root: Path::new("/done"),
            preserve_relative_to: Path::new("/in"),
            date_subdir: Some(date),
        };
        assert_eq!(
            Mover::parallel_path(&request)?,
            PathBuf::from("/done/2024-03-09/tray-4/img.jpg")
        );

        let undated = RelocateRequest {
            date_subdir: None,
            ..request
        };
        assert_eq!(
            Mover::parallel_path(&undated)?,
            PathBuf::from("/done/tray-4/img.jpg")
        );
        Ok(())
    }

    #[test]
    fn parallel_path_rejects_sources_outside_base() {
        let request = RelocateRequest {
            source: Path::new("/elsewhere/img.jpg"),
            destination_root: Path::new("/done"),
            preserve_relative_to: Path::new("/in"),
            date_subdir: None,
        };
        assert!(matches!(
            Mover::parallel_path(&request),
            Err(FsOpsError::InvalidInput {
                reason: "outside_base",
                ..
            })
        ));
    }

    #[test]
    fn suffix_goes_before_the_extension() {
        assert_eq!(
            with_suffix(Path::new("/d/a.tar.gz"), "1"),
            PathBuf::from("/d/a.tar (1).gz")
        );
        assert_eq!(
            with_suffix(Path::new("/d/README"), "2"),
            PathBuf::from("/d/README (2)")
        );
    }

    #[test]
    fn collisions_get_increasing_disambiguators() -> TestResult<()> {
        let (_temp, inbox, done) = layout()?;
        let mover = Mover::new();
        let mut finals = Vec::new();
        for body in ["one", "two", "three"] {
            let source = inbox.join("scan.jpg");
            fs::write(&source, body)?;
            finals.push(mover.relocate(&RelocateRequest {
                source: &source,
                destination_root: &done,
                preserve_relative_to: &inbox,
                date_subdir: None,
            })?);
            assert!(!source.exists());
        }
        assert_eq!(
            finals,
            vec![
                done.join("scan.jpg"),
                done.join("scan (1).jpg"),
                done.join("scan (2).jpg"),
            ]
        );
        assert_eq!(fs::read_to_string(done.join("scan (2).jpg"))?, "three");
        Ok(())
    }

    #[test]
    fn exhausted_cap_is_a_distinct_failure_and_leaves_source() -> TestResult<()> {
        let (_temp, inbox, done) = layout()?;
        fs::write(done.join("x.png"), "taken")?;
        fs::write(done.join("x (1).png"), "taken")?;
        let source = inbox.join("x.png");
        fs::write(&source, "new")?;

        let mover = Mover::with_collision_limit(1);
        let request = RelocateRequest {
            source: &source,
            destination_root: &done,
            preserve_relative_to: &inbox,
            date_subdir: None,
        };
        let err = mover.relocate(&request);
        assert!(matches!(err, Err(FsOpsError::CollisionLimit { limit: 1, .. })));
        assert!(source.exists());

        let forced = Mover::relocate_forced(&request)?;
        assert!(!source.exists());
        let name = forced
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(name.starts_with("x ("));
        assert!(name.ends_with(").png"));
        Ok(())
    }

    #[test]
    fn copy_then_remove_leaves_single_copy() -> TestResult<()> {
        let (_temp, inbox, done) = layout()?;
        let source = inbox.join("big.tif");
        fs::write(&source, vec![7_u8; 4096])?;
        let target = done.join("big.tif");

        assert_eq!(copy_then_remove(&source, &target)?, Placement::Placed);
        assert!(!source.exists());
        assert_eq!(fs::read(&target)?.len(), 4096);
        let leftovers: Vec<_> = fs::read_dir(&done)?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn placement_never_replaces_an_existing_target() -> TestResult<()> {
        let (_temp, inbox, done) = layout()?;
        let source = inbox.join("late.jpg");
        let target = done.join("late.jpg");
        fs::write(&source, "incoming")?;
        fs::write(&target, "claimed first")?;

        assert_eq!(place_file(&source, &target)?, Placement::Taken);
        assert_eq!(copy_then_remove(&source, &target)?, Placement::Taken);
        assert_eq!(fs::read_to_string(&source)?, "incoming");
        assert_eq!(fs::read_to_string(&target)?, "claimed first");
        let leftovers = fs::read_dir(&done)?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn relocate_creates_intermediate_directories() -> TestResult<()> {
        let (_temp, inbox, done) = layout()?;
        let nested = inbox.join("a").join("b");
        fs::create_dir_all(&nested)?;
        let source = nested.join("leaf.bmp");
        fs::write(&source, "leaf")?;
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).ok_or_else(|| anyhow::anyhow!("date"))?;

        let final_path = Mover::new().relocate(&RelocateRequest {
            source: &source,
            destination_root: &done,
            preserve_relative_to: &inbox,
            date_subdir: Some(date),
        })?;
        assert_eq!(final_path, done.join("2025-01-02/a/b/leaf.bmp"));
        assert!(final_path.is_file());
        Ok(())
    }
}
