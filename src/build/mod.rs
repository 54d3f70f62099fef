//! Build orchestration
//!
//! One build request runs through: skip/proceed decision, backend
//! dispatch (local toolchain or remote ephemeral host), artifact
//! discovery, version verification, staging. The first fatal error
//! aborts the build; nothing is partially staged.

pub mod discover;
pub mod local;
pub mod remote;

pub use discover::{bin_dir, discover_artifact, ArtifactMatcher, DiscoverError};
pub use local::LocalBuilder;
pub use remote::RemoteBuilder;

use std::path::Path;

use crate::artifact;
use crate::artifact::verify::VerifyError;
use crate::metadata::{App, BuildSpec};
use crate::process::ProcessError;
use crate::remote::TransportError;
use crate::scan::ScanError;
use crate::snapshot::SnapshotError;
use crate::vcs::VcsError;

/// Fatal errors for one build attempt
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{tool} build failed for {app_id}:{version}\n{output}")]
    ToolFailure {
        tool: &'static str,
        app_id: String,
        version: String,
        output: String,
    },

    #[error("scanner found {} problem(s):\n{}", .0.len(), .0.join("\n"))]
    ScanFindings(Vec<String>),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(#[from] DiscoverError),

    #[error("built package missing at {0}")]
    ArtifactMissing(String),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("remote transport error: {0}")]
    Remote(#[from] TransportError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Execution strategy for one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildBackend {
    Local,
    Remote,
}

/// Why a build was skipped without running anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Expected artifact already present in the output directory
    AlreadyBuilt,
    /// Artifact already present in the published repository
    AlreadyPublished,
    /// Commit reference carries the disabled marker
    Disabled,
}

/// Outcome of the skip/proceed decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Proceed(BuildBackend),
}

/// Run-mode flags carried by every build request
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    /// Output into the scratch directory only
    pub test: bool,
    /// Build despite scanner findings and app-level disabled flags
    pub force: bool,
    /// Build and install a debug version; terminal, no staging
    pub install: bool,
    /// Dispatch to the remote build host
    pub server: bool,
    /// Print build-tool output
    pub verbose: bool,
}

/// Decide whether one (app, spec) pair needs building.
///
/// Existence checks only, executed exactly once per request. The
/// already-built state is never re-derived mid-build, which would race
/// against partially written artifacts.
pub fn decide(
    app: &App,
    spec: &BuildSpec,
    output_dir: &Path,
    repo_dir: &Path,
    mode: RunMode,
) -> Decision {
    let dest = artifact::apk_path(output_dir, &app.id, &spec.vercode);
    if dest.exists() {
        return Decision::Skip(SkipReason::AlreadyBuilt);
    }

    // A published build must never be rebuilt; test mode deliberately
    // bypasses this so published versions stay reproducible in tmp.
    if !mode.test {
        let published = artifact::apk_path(repo_dir, &app.id, &spec.vercode);
        if published.exists() {
            return Decision::Skip(SkipReason::AlreadyPublished);
        }
    }

    // Author-level exclusion, not force-overridable.
    if spec.is_disabled() {
        return Decision::Skip(SkipReason::Disabled);
    }

    if mode.server {
        Decision::Proceed(BuildBackend::Remote)
    } else {
        Decision::Proceed(BuildBackend::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_app() -> App {
        App {
            id: "com.example.app".to_string(),
            repo: "https://example.com/repo.git".to_string(),
            repo_type: "git".to_string(),
            disabled: false,
            builds: vec![],
        }
    }

    fn sample_spec() -> BuildSpec {
        BuildSpec {
            version: "1.0".to_string(),
            vercode: "1".to_string(),
            commit: "abc123".to_string(),
            subdir: None,
            buildjni: None,
            maven: false,
            antcommand: None,
            bindir: None,
            initfun: false,
            novcheck: false,
        }
    }

    #[test]
    fn test_proceed_local_by_default() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();

        let decision = decide(
            &sample_app(),
            &sample_spec(),
            out.path(),
            repo.path(),
            RunMode::default(),
        );
        assert_eq!(decision, Decision::Proceed(BuildBackend::Local));
    }

    #[test]
    fn test_server_mode_selects_remote() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();

        let mode = RunMode {
            server: true,
            ..Default::default()
        };
        let decision = decide(&sample_app(), &sample_spec(), out.path(), repo.path(), mode);
        assert_eq!(decision, Decision::Proceed(BuildBackend::Remote));
    }

    #[test]
    fn test_skip_when_artifact_exists() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        fs::write(out.path().join("com.example.app_1.apk"), "apk").unwrap();

        // Idempotent regardless of force/test flags
        for (force, test) in [(false, false), (true, false), (false, true), (true, true)] {
            let mode = RunMode {
                force,
                test,
                ..Default::default()
            };
            let decision = decide(&sample_app(), &sample_spec(), out.path(), repo.path(), mode);
            assert_eq!(decision, Decision::Skip(SkipReason::AlreadyBuilt));
        }
    }

    #[test]
    fn test_skip_when_published() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("com.example.app_1.apk"), "apk").unwrap();

        let decision = decide(
            &sample_app(),
            &sample_spec(),
            out.path(),
            repo.path(),
            RunMode::default(),
        );
        assert_eq!(decision, Decision::Skip(SkipReason::AlreadyPublished));
    }

    #[test]
    fn test_published_check_bypassed_in_test_mode() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("com.example.app_1.apk"), "apk").unwrap();

        let mode = RunMode {
            test: true,
            ..Default::default()
        };
        let decision = decide(&sample_app(), &sample_spec(), out.path(), repo.path(), mode);
        assert_eq!(decision, Decision::Proceed(BuildBackend::Local));
    }

    #[test]
    fn test_disabled_marker_skips_even_under_force() {
        let out = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();

        let mut spec = sample_spec();
        spec.commit = "!skip".to_string();

        let mode = RunMode {
            force: true,
            test: true,
            ..Default::default()
        };
        let decision = decide(&sample_app(), &spec, out.path(), repo.path(), mode);
        assert_eq!(decision, Decision::Skip(SkipReason::Disabled));
    }
}
