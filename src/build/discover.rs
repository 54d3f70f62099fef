//! Artifact discovery
//!
//! Build tools report where they wrote the package only in their log
//! output, and the phrasing differs per tool and per tool version.
//! Matching is therefore isolated here: one matcher variant per release
//! tool, each with its pattern as a module constant, plus the legacy
//! fixed-filename layout as its own explicit variant. Callers only see
//! `discover_artifact`.

use regex_lite::Regex;
use std::path::{Path, PathBuf};

use crate::metadata::BuildSpec;

/// Maven logs the install destination of the built package
const MAVEN_INSTALL_PATTERN: &str = r"\[INFO\] Installing /.*/([^/]+)\.apk";

/// Ant's release target logs the created package name
const ANT_CREATE_PATTERN: &str = r"Creating (.+) for release";

/// Fixed filename template used by legacy project layouts
const LEGACY_NAME_TEMPLATE: &str = "funambol-android-sync-client-{version}-unsigned.apk";

/// Discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("no package path found in {tool} output (searched {searched} lines)")]
    NoMatch { tool: &'static str, searched: usize },
}

/// How to locate the built package for one build spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMatcher {
    /// Parse maven's `[INFO] Installing ...` line
    MavenInstall,
    /// Parse ant's `Creating ... for release` line
    AntCreate,
    /// Fixed filename derived from the version string
    LegacyFixedName,
}

impl ArtifactMatcher {
    /// Resolve the matcher for a build spec, once per build
    pub fn for_spec(spec: &BuildSpec) -> Self {
        if spec.initfun {
            ArtifactMatcher::LegacyFixedName
        } else if spec.maven {
            ArtifactMatcher::MavenInstall
        } else {
            ArtifactMatcher::AntCreate
        }
    }
}

/// The package output directory for one build: the spec-level override
/// relative to the build directory, or `bin` under the source root.
pub fn bin_dir(spec: &BuildSpec, build_dir: &Path, source_root: &Path) -> PathBuf {
    match &spec.bindir {
        Some(overridden) => build_dir.join(overridden),
        None => source_root.join("bin"),
    }
}

/// Locate the built package by matching the release tool's captured
/// output (or, for the legacy layout, by its fixed filename).
pub fn discover_artifact(
    matcher: ArtifactMatcher,
    spec: &BuildSpec,
    build_output: &str,
    bindir: &Path,
) -> Result<PathBuf, DiscoverError> {
    match matcher {
        ArtifactMatcher::LegacyFixedName => {
            let name = LEGACY_NAME_TEMPLATE.replace("{version}", &spec.version);
            Ok(bindir.join(name))
        }
        ArtifactMatcher::MavenInstall => {
            let re = Regex::new(MAVEN_INSTALL_PATTERN).unwrap();
            for line in build_output.lines() {
                if let Some(caps) = re.captures(line) {
                    return Ok(bindir.join(format!("{}.apk", &caps[1])));
                }
            }
            Err(DiscoverError::NoMatch {
                tool: "maven",
                searched: build_output.lines().count(),
            })
        }
        ArtifactMatcher::AntCreate => {
            let re = Regex::new(ANT_CREATE_PATTERN).unwrap();
            for line in build_output.lines() {
                if let Some(caps) = re.captures(line) {
                    return Ok(bindir.join(caps[1].trim()));
                }
            }
            Err(DiscoverError::NoMatch {
                tool: "ant",
                searched: build_output.lines().count(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    // Recorded sample outputs from real tool runs
    const ANT_OUTPUT: &str = "\
-release-sign:\n\
     [echo] Signing final apk...\n\
     [exec] Creating app-release-unsigned.apk for release\n\
BUILD SUCCESSFUL\n";

    const MAVEN_OUTPUT: &str = "\
[INFO] --- maven-install-plugin:2.3.1:install (default-install) ---\n\
[INFO] Installing /home/builder/tmp/mainline/application/target/callerid-1.0-SNAPSHOT.apk\n\
[INFO] BUILD SUCCESS\n";

    #[test]
    fn test_matcher_resolution() {
        let mut spec = sample_spec();
        assert_eq!(ArtifactMatcher::for_spec(&spec), ArtifactMatcher::AntCreate);

        spec.maven = true;
        assert_eq!(ArtifactMatcher::for_spec(&spec), ArtifactMatcher::MavenInstall);

        // Legacy layout wins over the tool selection
        spec.initfun = true;
        assert_eq!(ArtifactMatcher::for_spec(&spec), ArtifactMatcher::LegacyFixedName);
    }

    #[test]
    fn test_ant_discovery() {
        let spec = sample_spec();
        let path = discover_artifact(
            ArtifactMatcher::AntCreate,
            &spec,
            ANT_OUTPUT,
            Path::new("build/app/bin"),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("build/app/bin/app-release-unsigned.apk"));
    }

    #[test]
    fn test_maven_discovery() {
        let mut spec = sample_spec();
        spec.maven = true;
        let path = discover_artifact(
            ArtifactMatcher::MavenInstall,
            &spec,
            MAVEN_OUTPUT,
            Path::new("build/app/target"),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("build/app/target/callerid-1.0-SNAPSHOT.apk")
        );
    }

    #[test]
    fn test_legacy_fixed_name() {
        let mut spec = sample_spec();
        spec.version = "10.0.3".to_string();
        spec.initfun = true;

        let path = discover_artifact(
            ArtifactMatcher::LegacyFixedName,
            &spec,
            "", // output not consulted
            Path::new("bin"),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("bin/funambol-android-sync-client-10.0.3-unsigned.apk")
        );
    }

    #[test]
    fn test_no_match_is_descriptive() {
        let spec = sample_spec();
        let err = discover_artifact(
            ArtifactMatcher::AntCreate,
            &spec,
            "BUILD SUCCESSFUL\n",
            Path::new("bin"),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ant"));
        assert!(msg.contains("no package path"));
    }

    #[test]
    fn test_bin_dir_override() {
        let mut spec = sample_spec();
        assert_eq!(
            bin_dir(&spec, Path::new("build/app"), Path::new("build/app/android")),
            PathBuf::from("build/app/android/bin")
        );

        spec.bindir = Some("output".to_string());
        assert_eq!(
            bin_dir(&spec, Path::new("build/app"), Path::new("build/app/android")),
            PathBuf::from("build/app/output")
        );
    }
}
