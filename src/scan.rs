//! Pre-build source scanning
//!
//! Before anything is compiled, the prepared tree is scanned for
//! material that must not end up in an unsigned release build. The core
//! consumes the check through the `SourceScanner` trait as a
//! pass/fail-with-reasons capability; the built-in scanner flags
//! prebuilt binaries found in the source tree.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::metadata::BuildSpec;

/// Patterns the built-in scanner flags as problems
const FORBIDDEN_PATTERNS: &[&str] = &["**/*.so", "**/*.apk", "**/*.jar", "**/*.dex", "**/*.class"];

/// Scanner errors (the scan itself failing, not findings)
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Scans a prepared source tree; an empty result means clean
pub trait SourceScanner {
    fn scan(
        &self,
        build_dir: &Path,
        source_root: &Path,
        spec: &BuildSpec,
    ) -> Result<Vec<String>, ScanError>;
}

/// Built-in scanner flagging prebuilt binaries in the tree
pub struct BinaryScanner {
    forbidden: GlobSet,
}

impl BinaryScanner {
    pub fn new() -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in FORBIDDEN_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            forbidden: builder.build()?,
        })
    }
}

impl SourceScanner for BinaryScanner {
    fn scan(
        &self,
        build_dir: &Path,
        _source_root: &Path,
        spec: &BuildSpec,
    ) -> Result<Vec<String>, ScanError> {
        let mut problems = Vec::new();

        for entry in WalkDir::new(build_dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(build_dir)
                .unwrap_or(entry.path());

            // Native builds legitimately reference library sources; a
            // spec that builds JNI components gets its libs directory
            // regenerated, so prebuilt .so files there are expected.
            if spec.buildjni.is_some() {
                if let Some(ext) = rel.extension().and_then(|e| e.to_str()) {
                    if ext == "so" && rel.starts_with("libs") {
                        continue;
                    }
                }
            }

            if self.forbidden.is_match(rel) {
                problems.push(format!("binary file in source tree: {}", rel.display()));
            }
        }

        problems.sort();
        Ok(problems)
    }
}

/// Test scanner returning a configured list of problems
pub struct MockScanner {
    problems: Vec<String>,
}

impl MockScanner {
    /// Scanner that reports a clean tree
    pub fn clean() -> Self {
        Self { problems: vec![] }
    }

    /// Scanner that reports the given findings
    pub fn with_problems(problems: &[&str]) -> Self {
        Self {
            problems: problems.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SourceScanner for MockScanner {
    fn scan(
        &self,
        _build_dir: &Path,
        _source_root: &Path,
        _spec: &BuildSpec,
    ) -> Result<Vec<String>, ScanError> {
        Ok(self.problems.clone())
    }
}
