//! Version-control collaborator
//!
//! The build core consumes source checkout as a capability behind the
//! `SourcePreparer` trait: materialize the requested revision into a
//! clean build directory and hand back the effective source root. The
//! CLI-backed implementation shells out to the VCS tools through the
//! process runner; tests substitute `MockVcs`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::metadata::{App, BuildSpec};
use crate::process::{CommandRunner, ProcessError};

/// VCS errors
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("unknown repo type '{0}'")]
    UnknownRepoType(String),

    #[error("{operation} failed for {repo}: {detail}")]
    CommandFailed {
        operation: String,
        repo: String,
        detail: String,
    },

    #[error("source root does not exist: {0}")]
    MissingSourceRoot(PathBuf),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),
}

/// Materializes one build's source tree
pub trait SourcePreparer {
    /// Check out or update to the spec's revision inside `build_dir`,
    /// returning the effective source root (which may be a
    /// subdirectory of the checkout).
    fn prepare(&self, app: &App, spec: &BuildSpec, build_dir: &Path) -> Result<PathBuf, VcsError>;
}

/// Production preparer shelling out to git/svn/hg/bzr
pub struct CliVcs<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> CliVcs<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn run_checked(
        &self,
        operation: &str,
        repo: &str,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<(), VcsError> {
        let output = self.runner.run(program, args, cwd)?;
        if !output.success() {
            return Err(VcsError::CommandFailed {
                operation: operation.to_string(),
                repo: repo.to_string(),
                detail: output.combined(),
            });
        }
        Ok(())
    }

    fn checkout(&self, app: &App, build_dir: &Path) -> Result<(), VcsError> {
        let dest = build_dir.to_string_lossy();
        let parent = build_dir.parent().unwrap_or(Path::new("."));
        match app.repo_type.as_str() {
            "git" => self.run_checked("clone", &app.repo, "git", &["clone", &app.repo, &dest], parent),
            "svn" => self.run_checked("checkout", &app.repo, "svn", &["checkout", &app.repo, &dest], parent),
            "hg" => self.run_checked("clone", &app.repo, "hg", &["clone", &app.repo, &dest], parent),
            "bzr" => self.run_checked("branch", &app.repo, "bzr", &["branch", &app.repo, &dest], parent),
            other => Err(VcsError::UnknownRepoType(other.to_string())),
        }
    }

    fn update_to_revision(&self, app: &App, revision: &str, build_dir: &Path) -> Result<(), VcsError> {
        match app.repo_type.as_str() {
            "git" => {
                self.run_checked("fetch", &app.repo, "git", &["fetch", "origin"], build_dir)?;
                self.run_checked(
                    "checkout",
                    &app.repo,
                    "git",
                    &["checkout", "--force", revision],
                    build_dir,
                )?;
                self.run_checked("clean", &app.repo, "git", &["clean", "-dffx"], build_dir)
            }
            "svn" => self.run_checked(
                "update",
                &app.repo,
                "svn",
                &["update", "-r", revision],
                build_dir,
            ),
            "hg" => {
                self.run_checked("pull", &app.repo, "hg", &["pull"], build_dir)?;
                self.run_checked(
                    "update",
                    &app.repo,
                    "hg",
                    &["update", "--clean", "-r", revision],
                    build_dir,
                )
            }
            "bzr" => {
                self.run_checked("pull", &app.repo, "bzr", &["pull"], build_dir)?;
                self.run_checked(
                    "update",
                    &app.repo,
                    "bzr",
                    &["update", "-r", revision],
                    build_dir,
                )
            }
            other => Err(VcsError::UnknownRepoType(other.to_string())),
        }
    }
}

impl SourcePreparer for CliVcs<'_> {
    fn prepare(&self, app: &App, spec: &BuildSpec, build_dir: &Path) -> Result<PathBuf, VcsError> {
        if !build_dir.exists() {
            self.checkout(app, build_dir)?;
        }
        self.update_to_revision(app, &spec.commit, build_dir)?;

        let root = match &spec.subdir {
            Some(subdir) if !subdir.is_empty() => build_dir.join(subdir),
            _ => build_dir.to_path_buf(),
        };
        if !root.exists() {
            return Err(VcsError::MissingSourceRoot(root));
        }
        Ok(root)
    }
}

/// Test preparer that records calls and returns the build directory
/// (or a configured subdirectory) without touching any VCS.
#[derive(Default)]
pub struct MockVcs {
    calls: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preparer whose prepare() always fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// (app id, commit) pairs seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SourcePreparer for MockVcs {
    fn prepare(&self, app: &App, spec: &BuildSpec, build_dir: &Path) -> Result<PathBuf, VcsError> {
        self.calls
            .lock()
            .unwrap()
            .push((app.id.clone(), spec.commit.clone()));

        if self.fail {
            return Err(VcsError::CommandFailed {
                operation: "checkout".to_string(),
                repo: app.repo.clone(),
                detail: "mock failure".to_string(),
            });
        }

        Ok(match &spec.subdir {
            Some(subdir) if !subdir.is_empty() => build_dir.join(subdir),
            _ => build_dir.to_path_buf(),
        })
    }
}
