//! Artifact naming
//!
//! Deterministic names and paths for intermediate and final artifacts.
//! Every other component derives its paths from here; the (app id,
//! version code) pair is the primary key.

pub mod verify;

pub use verify::{verify_package, VerifyError};

use std::path::{Path, PathBuf};

/// Name of the unsigned package file for one build
pub fn apk_name(app_id: &str, vercode: &str) -> String {
    format!("{}_{}.apk", app_id, vercode)
}

/// Name of the source snapshot archive for one build
pub fn tarball_name(app_id: &str, vercode: &str) -> String {
    format!("{}_{}_src.tar.gz", app_id, vercode)
}

/// Stem of the source snapshot (top-level directory inside the archive)
pub fn tarball_stem(app_id: &str, vercode: &str) -> String {
    format!("{}_{}_src", app_id, vercode)
}

/// Path of the unsigned package within a directory
pub fn apk_path(dir: &Path, app_id: &str, vercode: &str) -> PathBuf {
    dir.join(apk_name(app_id, vercode))
}

/// Path of the source snapshot within a directory
pub fn tarball_path(dir: &Path, app_id: &str, vercode: &str) -> PathBuf {
    dir.join(tarball_name(app_id, vercode))
}
