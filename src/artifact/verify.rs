//! Package version verification
//!
//! Inspects a built package with aapt and checks that the embedded
//! version name and version code match what the build spec expected.
//! Downstream signing and publishing trust this check absolutely, so a
//! mismatch is a hard stop: the artifact must never be staged.

use regex_lite::Regex;
use std::path::Path;

use crate::process::{CommandRunner, ProcessError};

/// Delimiter some upstream projects embed after their true version
/// string (e.g. a changelog fragment). Only the prefix before it is
/// compared.
const VERSION_COMMENT_DELIMITER: &str = " //";

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("package inspector failed with exit code {exit_code}: {stderr}")]
    InspectorFailed { exit_code: i32, stderr: String },

    #[error("could not find version information in inspector output")]
    VersionInfoMissing,

    #[error(
        "version mismatch in {package}: got '{actual_version}' / '{actual_vercode}', \
         expected '{expected_version}' / '{expected_vercode}'"
    )]
    VersionMismatch {
        package: String,
        expected_version: String,
        expected_vercode: String,
        actual_version: String,
        actual_vercode: String,
    },

    #[error("process error: {0}")]
    Process(#[from] ProcessError),
}

/// Version fields declared by a package, as reported by the inspector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredVersion {
    pub version: String,
    pub vercode: String,
}

/// Truncate a declared version at the comment delimiter
pub fn normalize_version(version: &str) -> &str {
    match version.find(VERSION_COMMENT_DELIMITER) {
        Some(index) => &version[..index],
        None => version,
    }
}

/// Parse the declared version fields out of `aapt dump badging` output.
///
/// The fields live on the line starting with `package:`, as
/// `versionCode='...'` and `versionName='...'`. Missing either field is
/// a VersionInfoMissing error.
pub fn parse_badging(output: &str) -> Result<DeclaredVersion, VerifyError> {
    // Phrasing is aapt-version-dependent; keep the patterns local so
    // they can be swapped without touching callers.
    let vercode_re = Regex::new(r"versionCode='([0-9]*)'").unwrap();
    let version_re = Regex::new(r"versionName='([^']*)'").unwrap();

    let mut vercode = None;
    let mut version = None;

    for line in output.lines() {
        if !line.starts_with("package:") {
            continue;
        }
        if let Some(caps) = vercode_re.captures(line) {
            vercode = Some(caps[1].to_string());
        }
        if let Some(caps) = version_re.captures(line) {
            version = Some(caps[1].to_string());
        }
    }

    match (version, vercode) {
        (Some(version), Some(vercode)) => Ok(DeclaredVersion { version, vercode }),
        _ => Err(VerifyError::VersionInfoMissing),
    }
}

/// Verify that a built package declares the expected version and
/// version code.
pub fn verify_package(
    runner: &dyn CommandRunner,
    aapt: &Path,
    package: &Path,
    expected_version: &str,
    expected_vercode: &str,
) -> Result<(), VerifyError> {
    let aapt_str = aapt.to_string_lossy();
    let package_str = package.to_string_lossy();
    let output = runner.run(
        &aapt_str,
        &["dump", "badging", &package_str],
        Path::new("."),
    )?;

    if !output.success() {
        return Err(VerifyError::InspectorFailed {
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }

    let declared = parse_badging(&output.stdout)?;
    let normalized = normalize_version(&declared.version);

    if normalized != expected_version || declared.vercode != expected_vercode {
        return Err(VerifyError::VersionMismatch {
            package: package_str.into_owned(),
            expected_version: expected_version.to_string(),
            expected_vercode: expected_vercode.to_string(),
            actual_version: normalized.to_string(),
            actual_vercode: declared.vercode,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockRunner;

    const SAMPLE_BADGING: &str = "package: name='com.example.app' versionCode='1' versionName='1.0'\n\
        sdkVersion:'8'\n\
        application-label:'Example'\n";

    #[test]
    fn test_parse_badging() {
        let declared = parse_badging(SAMPLE_BADGING).unwrap();
        assert_eq!(declared.version, "1.0");
        assert_eq!(declared.vercode, "1");
    }

    #[test]
    fn test_parse_badging_missing_fields() {
        let err = parse_badging("application-label:'Example'\n").unwrap_err();
        assert!(matches!(err, VerifyError::VersionInfoMissing));
    }

    #[test]
    fn test_parse_ignores_non_package_lines() {
        // versionCode outside the package: line must not count
        let output = "uses-feature: versionCode='9'\n";
        let err = parse_badging(output).unwrap_err();
        assert!(matches!(err, VerifyError::VersionInfoMissing));
    }

    #[test]
    fn test_normalize_version_truncates_changelog() {
        assert_eq!(
            normalize_version("1.2.3 // full changelog: fixed crash, new icons"),
            "1.2.3"
        );
        assert_eq!(normalize_version("1.2.3"), "1.2.3");
    }

    #[test]
    fn test_verify_ok() {
        let runner = MockRunner::new();
        runner.script_ok("aapt", SAMPLE_BADGING);

        verify_package(
            &runner,
            Path::new("aapt"),
            Path::new("bin/app-release.apk"),
            "1.0",
            "1",
        )
        .unwrap();
    }

    #[test]
    fn test_verify_vercode_mismatch() {
        let runner = MockRunner::new();
        runner.script_ok(
            "aapt",
            "package: name='com.example.app' versionCode='7' versionName='1.0'\n",
        );

        let err = verify_package(
            &runner,
            Path::new("aapt"),
            Path::new("bin/app-release.apk"),
            "1.0",
            "8",
        )
        .unwrap_err();

        match err {
            VerifyError::VersionMismatch {
                expected_vercode,
                actual_vercode,
                ..
            } => {
                assert_eq!(expected_vercode, "8");
                assert_eq!(actual_vercode, "7");
            }
            other => panic!("expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_normalized_version_accepted() {
        let runner = MockRunner::new();
        runner.script_ok(
            "aapt",
            "package: name='org.timeriffic' versionCode='3' versionName='1.2.3 // changelog here'\n",
        );

        verify_package(
            &runner,
            Path::new("aapt"),
            Path::new("bin/app.apk"),
            "1.2.3",
            "3",
        )
        .unwrap();
    }

    #[test]
    fn test_verify_inspector_failure() {
        let runner = MockRunner::new();
        runner.script_fail("aapt", 1, "ERROR: dump failed");

        let err = verify_package(
            &runner,
            Path::new("aapt"),
            Path::new("bin/app.apk"),
            "1.0",
            "1",
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::InspectorFailed { .. }));
    }
}
