//! Application metadata model
//!
//! Applications and their build specs are defined in per-app TOML files
//! under the metadata directory. The core treats the loaded model as
//! read-only; all mutation happens in the metadata files themselves.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Sentinel prefix on a commit reference marking the build as disabled
/// by the metadata author. Distinct from the app-level `disabled` flag
/// and never overridden by force mode.
pub const DISABLED_COMMIT_PREFIX: char = '!';

/// Metadata loading errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("duplicate version code '{vercode}' in app '{app_id}'")]
    DuplicateVercode { app_id: String, vercode: String },

    #[error("metadata directory not found: {0}")]
    MissingDir(String),
}

/// One buildable version definition belonging to an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Human-readable version string as declared by upstream
    pub version: String,

    /// Integer-like ordinal, unique within the application. Primary key
    /// for artifact naming and already-built checks.
    pub vercode: String,

    /// Source-control revision to build. A leading '!' disables this
    /// build entirely.
    pub commit: String,

    /// Project subdirectory within the checkout, if any
    #[serde(default)]
    pub subdir: Option<String>,

    /// Native components to build with ndk-build. An empty-string entry
    /// means "build at the project root".
    #[serde(default)]
    pub buildjni: Option<Vec<String>>,

    /// Build with maven instead of ant
    #[serde(default)]
    pub maven: bool,

    /// Custom ant target replacing the default `release`
    #[serde(default)]
    pub antcommand: Option<String>,

    /// Output subdirectory override, relative to the build directory
    #[serde(default)]
    pub bindir: Option<String>,

    /// Legacy project layout with a fixed output filename template
    #[serde(default)]
    pub initfun: bool,

    /// Skip automatic version verification of the built package
    #[serde(default)]
    pub novcheck: bool,
}

impl BuildSpec {
    /// Whether this build carries the author-level disabled marker
    pub fn is_disabled(&self) -> bool {
        self.commit.starts_with(DISABLED_COMMIT_PREFIX)
    }
}

/// One application tracked by the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Stable unique identifier (package id)
    pub id: String,

    /// Repository URL
    pub repo: String,

    /// Repository kind (git, svn, hg, bzr). Empty means not buildable.
    #[serde(default)]
    pub repo_type: String,

    /// App-level disabled flag (overridable by force mode)
    #[serde(default)]
    pub disabled: bool,

    /// Ordered build definitions
    #[serde(default)]
    pub builds: Vec<BuildSpec>,
}

impl App {
    /// Validate per-app invariants. Version codes must be unique across
    /// the app's build specs.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let mut seen = HashSet::new();
        for spec in &self.builds {
            if !seen.insert(spec.vercode.as_str()) {
                return Err(MetadataError::DuplicateVercode {
                    app_id: self.id.clone(),
                    vercode: spec.vercode.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load a single app from a TOML metadata file
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let contents = fs::read_to_string(path).map_err(|e| MetadataError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let app: App = toml::from_str(&contents).map_err(|e| MetadataError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        app.validate()?;
        Ok(app)
    }
}

/// Load all apps from a metadata directory, sorted by id
pub fn load_apps(metadata_dir: &Path) -> Result<Vec<App>, MetadataError> {
    if !metadata_dir.is_dir() {
        return Err(MetadataError::MissingDir(metadata_dir.display().to_string()));
    }

    let mut apps = Vec::new();
    let entries = fs::read_dir(metadata_dir).map_err(|e| MetadataError::Io {
        path: metadata_dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| MetadataError::Io {
            path: metadata_dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            apps.push(App::from_file(&path)?);
        }
    }

    apps.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(apps)
}
