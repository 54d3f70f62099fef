//! Source snapshots
//!
//! Archives the entire build directory into a compressed tarball before
//! the release build runs, so even a failed build leaves a reproducible
//! source record behind. Version-control metadata directories are
//! excluded by path suffix, wherever they appear in the tree.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Directory names excluded from snapshots, matched as a path suffix
/// anywhere in the tree
pub const VCS_METADATA_DIRS: &[&str] = &[".svn", ".git", ".hg", ".bzr"];

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path is not within the build directory: {0}")]
    PathOutsideTree(PathBuf),
}

/// Whether a directory entry is version-control metadata
fn is_vcs_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| VCS_METADATA_DIRS.contains(&name))
        .unwrap_or(false)
}

/// Archive `build_dir` into a gzip tarball at `dest`, rooted at
/// `stem` inside the archive.
///
/// VCS metadata directories are pruned, including everything beneath
/// them. The tarball is written in full before this returns.
pub fn create_snapshot(build_dir: &Path, dest: &Path, stem: &str) -> Result<(), SnapshotError> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let walker = WalkDir::new(build_dir)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_vcs_dir(e.path())));

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let rel = path
            .strip_prefix(build_dir)
            .map_err(|_| SnapshotError::PathOutsideTree(path.to_path_buf()))?;

        let archive_path = if rel.as_os_str().is_empty() {
            PathBuf::from(stem)
        } else {
            Path::new(stem).join(rel)
        };

        if entry.file_type().is_dir() {
            builder.append_dir(&archive_path, path)?;
        } else if entry.file_type().is_file() {
            let mut f = File::open(path)?;
            builder.append_file(&archive_path, &mut f)?;
        }
        // Symlinks are skipped; checkouts are materialized trees.
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Move a snapshot into the output directory, unless scratch and output
/// are the same directory (test-mode short-circuit).
pub fn stage_snapshot(tmp_dir: &Path, output_dir: &Path, name: &str) -> Result<(), SnapshotError> {
    if tmp_dir == output_dir {
        return Ok(());
    }
    let from = tmp_dir.join(name);
    let to = output_dir.join(name);
    // rename fails across filesystems; fall back to copy-and-remove
    if fs::rename(&from, &to).is_err() {
        fs::copy(&from, &to)?;
        fs::remove_file(&from)?;
    }
    Ok(())
}
