//! Run configuration
//!
//! All paths and tool locations live in one explicit `ForgeConfig` value,
//! constructed once at startup (from `apkforge.toml` plus defaults) and
//! passed into every component. There is no ambient global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
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
}

/// Remote build host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory holding the Vagrant build host definition
    pub builder_dir: PathBuf,

    /// Remote home directory where tool files and sources land
    pub remote_home: String,

    /// SSH connect timeout in seconds
    pub connect_timeout_seconds: u32,

    /// SFTP channel timeout in seconds
    pub channel_timeout_seconds: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            builder_dir: PathBuf::from("builder"),
            remote_home: "/home/vagrant".to_string(),
            connect_timeout_seconds: 10,
            channel_timeout_seconds: 15,
        }
    }
}

/// Full run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Android SDK location
    pub sdk_path: PathBuf,

    /// Android NDK location
    pub ndk_path: PathBuf,

    /// Metadata directory (per-app TOML files)
    pub metadata_dir: PathBuf,

    /// Per-app checkouts live under this directory
    pub build_dir: PathBuf,

    /// Scratch directory; also the output directory in test mode
    pub tmp_dir: PathBuf,

    /// Final output directory for unsigned packages
    pub unsigned_dir: PathBuf,

    /// Published repository directory (already-published builds are
    /// never rebuilt)
    pub repo_dir: PathBuf,

    /// Per-app failure logs
    pub log_dir: PathBuf,

    /// Remote build host settings
    pub remote: RemoteConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            sdk_path: PathBuf::from("/opt/android-sdk"),
            ndk_path: PathBuf::from("/opt/android-ndk"),
            metadata_dir: PathBuf::from("metadata"),
            build_dir: PathBuf::from("build"),
            tmp_dir: PathBuf::from("tmp"),
            unsigned_dir: PathBuf::from("unsigned"),
            repo_dir: PathBuf::from("repo"),
            log_dir: PathBuf::from("logs"),
            remote: RemoteConfig::default(),
        }
    }
}

impl ForgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// unset keys
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load from a file if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Output directory for the given run mode. Test builds land in the
    /// scratch directory and never touch the unsigned output.
    pub fn output_dir(&self, test_mode: bool) -> &Path {
        if test_mode {
            &self.tmp_dir
        } else {
            &self.unsigned_dir
        }
    }

    /// Checkout directory for one application
    pub fn app_build_dir(&self, app_id: &str) -> PathBuf {
        self.build_dir.join(app_id)
    }

    /// Path to the ndk-build executable
    pub fn ndk_build(&self) -> PathBuf {
        self.ndk_path.join("ndk-build")
    }

    /// Path to the aapt package inspector
    pub fn aapt(&self) -> PathBuf {
        self.sdk_path.join("platform-tools").join("aapt")
    }
}
