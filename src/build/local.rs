//! Local build backend
//!
//! Runs one build with the local toolchain: prepare source, scan,
//! snapshot, optional native build, release build, artifact discovery,
//! version verification, staging. Steps run strictly in order and the
//! first failure aborts the build.

use std::fs;
use std::path::Path;

use crate::artifact;
use crate::artifact::verify::verify_package;
use crate::build::discover::{bin_dir, discover_artifact, ArtifactMatcher};
use crate::build::{BuildError, RunMode};
use crate::config::ForgeConfig;
use crate::metadata::{App, BuildSpec};
use crate::process::CommandRunner;
use crate::scan::SourceScanner;
use crate::snapshot;
use crate::summary::BuildOutcome;
use crate::vcs::SourcePreparer;

/// Local toolchain backend
pub struct LocalBuilder<'a> {
    config: &'a ForgeConfig,
    runner: &'a dyn CommandRunner,
    vcs: &'a dyn SourcePreparer,
    scanner: &'a dyn SourceScanner,
}

impl<'a> LocalBuilder<'a> {
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

    /// Run one build end to end, staging into `output_dir`
    pub fn build(
        &self,
        app: &App,
        spec: &BuildSpec,
        mode: RunMode,
        output_dir: &Path,
    ) -> Result<BuildOutcome, BuildError> {
        let build_dir = self.config.app_build_dir(&app.id);

        // 1. Materialize the requested revision
        let root_dir = self.vcs.prepare(app, spec, &build_dir)?;

        // 2. Scan before building
        let problems = self.scanner.scan(&build_dir, &root_dir, spec)?;
        if !problems.is_empty() {
            if !mode.force {
                return Err(BuildError::ScanFindings(problems));
            }
            eprintln!("Scanner found {} problem(s), building anyway:", problems.len());
            for problem in &problems {
                eprintln!("...{}", problem);
            }
        }

        // 3. Snapshot the source before any compilation, so a failed
        //    build still leaves a reproducible record in tmp
        let tarball_name = artifact::tarball_name(&app.id, &spec.vercode);
        let tarball = artifact::tarball_path(&self.config.tmp_dir, &app.id, &spec.vercode);
        snapshot::create_snapshot(
            &build_dir,
            &tarball,
            &artifact::tarball_stem(&app.id, &spec.vercode),
        )?;

        // 4. Native components, one ndk-build invocation each
        if let Some(components) = &spec.buildjni {
            let ndk_build = self.config.ndk_build();
            let ndk_build = ndk_build.to_string_lossy();
            for component in components {
                let cwd = if component.is_empty() {
                    root_dir.clone()
                } else {
                    root_dir.join(component)
                };
                if mode.verbose {
                    eprintln!("Running ndk-build in {}", cwd.display());
                }
                let output = self.runner.run(&ndk_build, &[], &cwd)?;
                if !output.success() {
                    return Err(BuildError::ToolFailure {
                        tool: "ndk",
                        app_id: app.id.clone(),
                        version: spec.version.clone(),
                        output: output.combined(),
                    });
                }
            }
        }

        // 5. Release build: maven, or ant with install-mode targets, a
        //    spec-level custom target, or the default release target
        let (tool, output) = if spec.maven {
            let sdk_arg = format!("-Dandroid.sdk.path={}", self.config.sdk_path.display());
            let output = self
                .runner
                .run("mvn", &["clean", "install", &sdk_arg], &root_dir)?;
            ("maven", output)
        } else {
            let targets: Vec<&str> = if mode.install {
                vec!["debug", "install"]
            } else if let Some(target) = &spec.antcommand {
                vec![target.as_str()]
            } else {
                vec!["release"]
            };
            let output = self.runner.run("ant", &targets, &root_dir)?;
            ("ant", output)
        };
        if !output.success() {
            return Err(BuildError::ToolFailure {
                tool,
                app_id: app.id.clone(),
                version: spec.version.clone(),
                output: output.combined(),
            });
        }
        if mode.verbose {
            println!("{}", output.stdout);
        }

        // Installing to a device is a terminal success, nothing staged
        if mode.install {
            return Ok(BuildOutcome::Installed);
        }

        // 6. Locate the built package in the tool output
        let matcher = ArtifactMatcher::for_spec(spec);
        let bindir = bin_dir(spec, &build_dir, &root_dir);
        let src = discover_artifact(matcher, spec, &output.stdout, &bindir)?;
        if !src.is_file() {
            return Err(BuildError::ArtifactMissing(src.display().to_string()));
        }

        // 7. Confirm the package declares the expected version
        if !spec.novcheck {
            let aapt = self.config.aapt();
            verify_package(self.runner, &aapt, &src, &spec.version, &spec.vercode)?;
        }

        // 8. Stage only after verification: copy the package, move the
        //    snapshot (unless scratch and output are the same directory)
        let dest = artifact::apk_path(output_dir, &app.id, &spec.vercode);
        fs::copy(&src, &dest)?;
        snapshot::stage_snapshot(&self.config.tmp_dir, output_dir, &tarball_name)?;

        Ok(BuildOutcome::Succeeded { artifact: dest })
    }
}
