//! apkforge - Batch build engine for unsigned Android packages
//!
//! This crate implements apkforge, a build orchestrator that turns
//! per-app metadata into reproducible unsigned packages: check out the
//! requested revision, scan it, snapshot it, run the build toolchain
//! locally or on an ephemeral remote host, verify the declared version,
//! and stage the outputs.

pub mod artifact;
pub mod batch;
pub mod build;
pub mod config;
pub mod metadata;
pub mod process;
pub mod remote;
pub mod scan;
pub mod snapshot;
pub mod summary;
pub mod vcs;

pub use batch::{BatchError, BatchOptions, BatchRunner};
pub use build::{decide, BuildBackend, BuildError, Decision, RunMode, SkipReason};
pub use config::ForgeConfig;
pub use metadata::{load_apps, App, BuildSpec};
pub use summary::{BuildOutcome, FailureKind, RunSummary};
