//! Run summaries
//!
//! Aggregates per-build outcomes into the end-of-run report: which apps
//! had at least one successful build, which failed and why, and overall
//! counts. The summary is printed and written as JSON next to the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::build::SkipReason;

/// Outcome of one build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Nothing to do: already built, already published, or disabled
    Skipped(SkipReason),
    /// Build completed and the artifact was staged
    Succeeded { artifact: PathBuf },
    /// Install-mode build deployed to a device; terminal, no artifact
    Installed,
}

/// Category of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Build-level failure (tool exit, scan findings, verification)
    Build,
    /// Source checkout or update failure
    Vcs,
    /// Anything else
    Unexpected,
}

/// One recorded failure, keyed by app id in the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub detail: String,
}

/// End-of-run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the summary was created
    pub created_at: DateTime<Utc>,

    /// Apps with at least one successful build, in run order
    pub succeeded: Vec<String>,

    /// App id to failure detail
    pub failed: BTreeMap<String, FailureRecord>,

    /// Number of builds skipped by the decision engine
    pub skipped: usize,

    /// Number of successful builds
    pub builds_succeeded: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            succeeded: Vec::new(),
            failed: BTreeMap::new(),
            skipped: 0,
            builds_succeeded: 0,
        }
    }

    /// Record one successful build for an app
    pub fn record_success(&mut self, app_id: &str) {
        self.builds_succeeded += 1;
        if !self.succeeded.iter().any(|id| id == app_id) {
            self.succeeded.push(app_id.to_string());
        }
    }

    /// Record one skipped build
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Record a failure against an app id. A later failure for the same
    /// app replaces the earlier one, matching run order.
    pub fn record_failure(&mut self, app_id: &str, kind: FailureKind, detail: String) {
        self.failed
            .insert(app_id.to_string(), FailureRecord { kind, detail });
    }

    /// Whether any failure was recorded
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Render the end-of-run report
    pub fn to_human(&self) -> String {
        let mut out = String::new();
        for app_id in &self.succeeded {
            out.push_str(&format!("success: {}\n", app_id));
        }
        for (app_id, record) in &self.failed {
            out.push_str(&format!("Build for app {} failed:\n{}\n", app_id, record.detail));
        }
        out.push_str("Finished.\n");
        if self.builds_succeeded > 0 {
            out.push_str(&format!("{} builds succeeded\n", self.builds_succeeded));
        }
        if !self.failed.is_empty() {
            out.push_str(&format!("{} builds failed\n", self.failed.len()));
        }
        out
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON summary to a file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Append failure text to the per-app log file under `log_dir`
pub fn append_app_log(log_dir: &Path, app_id: &str, text: &str) -> io::Result<()> {
    use std::io::Write;

    let path = log_dir.join(format!("{}.log", app_id));
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", text)?;
    Ok(())
}
