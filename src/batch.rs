//! Batch orchestration
//!
//! Selects the apps and builds to attempt, dispatches each to the
//! local or remote backend, and collects outcomes into a run summary.
//! One app failing never blocks the rest of the batch unless the
//! stop-on-failure flag is set.

use std::path::PathBuf;

use crate::build::{decide, BuildBackend, BuildError, Decision, LocalBuilder, RemoteBuilder, RunMode};
use crate::config::ForgeConfig;
use crate::metadata::{App, BuildSpec};
use crate::process::CommandRunner;
use crate::scan::SourceScanner;
use crate::summary::{append_app_log, BuildOutcome, FailureKind, RunSummary};
use crate::vcs::SourcePreparer;

/// Errors that abort the whole batch
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no app matching package id '{0}'")]
    NoMatchingApp(String),

    #[error("Nothing to do - all apps are disabled or have no builds defined.")]
    NothingToDo,

    #[error("build failed: {0}")]
    Stopped(#[from] BuildError),
}

/// Selection and behavior flags for one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Restrict the run to one app id
    pub package: Option<String>,
    /// Restrict the run to one version code within the selected apps
    pub vercode: Option<String>,
    /// Abort the batch at the first failed build
    pub stop_on_failure: bool,
    /// Local configuration file to mirror to remote hosts
    pub config_file: Option<PathBuf>,
    pub mode: RunMode,
}

/// Runs a batch of build requests against shared collaborators
pub struct BatchRunner<'a> {
    config: &'a ForgeConfig,
    runner: &'a dyn CommandRunner,
    vcs: &'a dyn SourcePreparer,
    scanner: &'a dyn SourceScanner,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        config: &'a ForgeConfig,
        runner: &'a dyn CommandRunner,
        vcs: &'a dyn SourcePreparer,
        scanner: &'a dyn SourceScanner,
    ) -> Self {
        Self {
            config,
            runner,
            vcs,
            scanner,
        }
    }

    /// Attempt every selected build, recording outcomes as it goes
    pub fn run(&self, apps: &[App], options: &BatchOptions) -> Result<RunSummary, BatchError> {
        let selected = select_apps(apps, options)?;
        let output_dir = self.config.output_dir(options.mode.test).to_path_buf();

        let mut summary = RunSummary::new();
        for app in selected {
            let specs = app
                .builds
                .iter()
                .filter(|spec| match &options.vercode {
                    Some(vercode) => spec.vercode == *vercode,
                    None => true,
                });

            for spec in specs {
                match self.attempt(app, spec, options, &output_dir) {
                    Ok(BuildOutcome::Skipped(reason)) => {
                        if options.mode.verbose {
                            eprintln!("Skipping {}:{} ({:?})", app.id, spec.vercode, reason);
                        }
                        summary.record_skip();
                    }
                    Ok(_) => {
                        println!(
                            "Successfully built version {} of {}",
                            spec.version, app.id
                        );
                        summary.record_success(&app.id);
                    }
                    Err(err) => {
                        let kind = classify(&err);
                        let detail = err.to_string();
                        eprintln!("Build for app {} failed:\n{}", app.id, detail);
                        if let Err(log_err) =
                            append_app_log(&self.config.log_dir, &app.id, &detail)
                        {
                            eprintln!("Could not write log for {}: {}", app.id, log_err);
                        }
                        summary.record_failure(&app.id, kind, detail);
                        if options.stop_on_failure {
                            return Err(BatchError::Stopped(err));
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    fn attempt(
        &self,
        app: &App,
        spec: &BuildSpec,
        options: &BatchOptions,
        output_dir: &std::path::Path,
    ) -> Result<BuildOutcome, BuildError> {
        match decide(app, spec, output_dir, &self.config.repo_dir, options.mode) {
            Decision::Skip(reason) => Ok(BuildOutcome::Skipped(reason)),
            Decision::Proceed(backend) => {
                println!("Building version {} of {}", spec.version, app.id);
                match backend {
                    BuildBackend::Local => {
                        LocalBuilder::new(self.config, self.runner, self.vcs, self.scanner)
                            .build(app, spec, options.mode, output_dir)
                    }
                    BuildBackend::Remote => RemoteBuilder::new(self.config, self.runner).build(
                        app,
                        spec,
                        options.mode,
                        output_dir,
                        options.config_file.as_deref(),
                    ),
                }
            }
        }
    }
}

/// An explicit package filter that matches nothing is an error, and so
/// is a selection that leaves nothing buildable; the per-app exclusions
/// (app disabled, no repo, no builds) drop apps individually.
fn select_apps<'s>(apps: &'s [App], options: &BatchOptions) -> Result<Vec<&'s App>, BatchError> {
    if let Some(package) = &options.package {
        if !apps.iter().any(|app| app.id == *package) {
            return Err(BatchError::NoMatchingApp(package.clone()));
        }
    }

    let selected: Vec<&App> = apps
        .iter()
        .filter(|app| {
            if let Some(package) = &options.package {
                if app.id != *package {
                    return false;
                }
            }
            (options.mode.force || !app.disabled)
                && !app.repo_type.is_empty()
                && !app.builds.is_empty()
        })
        .collect();

    if selected.is_empty() {
        return Err(BatchError::NothingToDo);
    }
    Ok(selected)
}

fn classify(err: &BuildError) -> FailureKind {
    match err {
        BuildError::Vcs(_) => FailureKind::Vcs,
        BuildError::Io(_) | BuildError::Process(_) => FailureKind::Unexpected,
        _ => FailureKind::Build,
    }
}
