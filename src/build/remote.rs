//! Remote build backend
//!
//! Drives one build on an ephemeral Vagrant host: reset the host,
//! provision it, mirror the app's metadata and source tree over the
//! session, run the builder remotely, and retrieve the outputs. The
//! host is destroyed after every attempt, pass or fail.

use std::fs;
use std::path::Path;

use crate::artifact;
use crate::build::{BuildError, RunMode};
use crate::config::ForgeConfig;
use crate::metadata::{App, BuildSpec};
use crate::process::CommandRunner;
use crate::remote::{RemoteSession, SshHostConfig, SshSession, TransportError};
use crate::summary::BuildOutcome;

/// File the provisioning step writes the generated ssh parameters to,
/// inside the builder directory.
const SSH_CONFIG_FILE: &str = "sshconfig";

/// Ephemeral-host backend
pub struct RemoteBuilder<'a> {
    config: &'a ForgeConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> RemoteBuilder<'a> {
    pub fn new(config: &'a ForgeConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Run one build on a fresh host, staging retrieved outputs into
    /// `output_dir`. `config_file` is the local configuration to mirror
    /// to the host, if one exists.
    pub fn build(
        &self,
        app: &App,
        spec: &BuildSpec,
        mode: RunMode,
        output_dir: &Path,
        config_file: Option<&Path>,
    ) -> Result<BuildOutcome, BuildError> {
        self.reset_host(mode)?;
        self.provision(mode)?;

        let host = self.write_ssh_config()?;
        let mut session = SshSession::new(self.runner, host, self.config.remote.clone());

        let result = self.run_on_host(&mut session, app, spec, mode, output_dir, config_file);

        // Exactly one teardown per attempt, regardless of outcome. The
        // build result takes precedence when both fail.
        let teardown = self.destroy(mode);
        let outcome = result?;
        teardown?;
        Ok(outcome)
    }

    /// Destroy any leftover host from a previous run
    fn reset_host(&self, mode: RunMode) -> Result<(), BuildError> {
        let builder_dir = &self.config.remote.builder_dir;
        if !builder_dir.join(".vagrant").exists() {
            return Ok(());
        }
        if mode.verbose {
            eprintln!("Destroying leftover build host");
        }
        self.destroy(mode)
    }

    fn provision(&self, mode: RunMode) -> Result<(), BuildError> {
        let builder_dir = &self.config.remote.builder_dir;
        if mode.verbose {
            eprintln!("Provisioning build host in {}", builder_dir.display());
        }
        let output = self.runner.run("vagrant", &["up"], builder_dir)?;
        if !output.success() {
            return Err(TransportError::ProvisionFailed(output.combined()).into());
        }
        Ok(())
    }

    fn destroy(&self, mode: RunMode) -> Result<(), BuildError> {
        let builder_dir = &self.config.remote.builder_dir;
        if mode.verbose {
            eprintln!("Destroying build host");
        }
        let output = self.runner.run("vagrant", &["destroy", "-f"], builder_dir)?;
        if !output.success() {
            return Err(TransportError::DestroyFailed(output.combined()).into());
        }
        Ok(())
    }

    /// Capture `vagrant ssh-config` to a file and parse the connection
    /// parameters out of it.
    fn write_ssh_config(&self) -> Result<SshHostConfig, BuildError> {
        let builder_dir = &self.config.remote.builder_dir;
        let output = self.runner.run("vagrant", &["ssh-config"], builder_dir)?;
        if !output.success() {
            return Err(TransportError::ConnectionConfig(output.combined()).into());
        }
        let path = builder_dir.join(SSH_CONFIG_FILE);
        fs::write(&path, &output.stdout)?;
        SshHostConfig::parse(&output.stdout).map_err(BuildError::Remote)
    }

    /// The session-level portion of a remote build: mirror inputs, run
    /// the builder, retrieve outputs. Separated from host lifecycle so
    /// it can run against any session.
    pub fn run_on_host(
        &self,
        session: &mut dyn RemoteSession,
        app: &App,
        spec: &BuildSpec,
        mode: RunMode,
        output_dir: &Path,
        config_file: Option<&Path>,
    ) -> Result<BuildOutcome, BuildError> {
        let home = self.config.remote.remote_home.clone();
        session.chdir(&home);

        session.mkdir("metadata")?;
        session.mkdir("build")?;

        if let Some(config_file) = config_file {
            session.put(config_file, "config.toml")?;
        }

        // Only the one app's metadata goes over
        session.chdir("metadata");
        let metadata_file = self.config.metadata_dir.join(format!("{}.toml", app.id));
        session.put(&metadata_file, &format!("{}.toml", app.id))?;
        session.chdir("..");

        // Mirror the local checkout so the host builds the exact tree
        // we prepared, not a fresh clone
        session.chdir("build");
        session.mkdir("extlib")?;
        session.mkdir(&app.id)?;
        session.chdir(&app.id);
        let build_dir = self.config.app_build_dir(&app.id);
        mirror_tree(session, &build_dir)?;
        session.chdir(&home);

        let mut command = format!(
            "cd '{}' && apkforge --on-server -p {} -c {}",
            home, app.id, spec.vercode
        );
        if mode.verbose {
            command.push_str(" -v");
        }
        if mode.test {
            command.push_str(" -t");
        }
        if mode.force {
            command.push_str(" -f");
        }
        let output = session.exec(&command)?;
        if mode.verbose {
            println!("{}", output.stdout);
        }
        if !output.success() {
            return Err(TransportError::ExecFailed {
                exit_code: output.exit_code,
                detail: output.combined(),
            }
            .into());
        }

        // Retrieve from wherever the on-server run staged
        let remote_output = if mode.test { "tmp" } else { "unsigned" };
        session.chdir(&format!("{}/{}", home, remote_output));

        let apk_name = artifact::apk_name(&app.id, &spec.vercode);
        let apk_dest = output_dir.join(&apk_name);
        session.get(&apk_name, &apk_dest)?;

        let tarball_name = artifact::tarball_name(&app.id, &spec.vercode);
        session.get(&tarball_name, &output_dir.join(&tarball_name))?;

        Ok(BuildOutcome::Succeeded { artifact: apk_dest })
    }
}

/// Upload a directory tree through the session, recreating it under the
/// session's current working directory. Directories first, then files,
/// in name order, so the transcript is deterministic.
fn mirror_tree(session: &mut dyn RemoteSession, local_dir: &Path) -> Result<(), BuildError> {
    let mut entries: Vec<_> = fs::read_dir(local_dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries.iter().filter(|p| p.is_dir()) {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        session.mkdir(&name)?;
        session.chdir(&name);
        mirror_tree(session, path)?;
        session.chdir("..");
    }
    for path in entries.iter().filter(|p| p.is_file()) {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        session.put(path, &name)?;
    }
    Ok(())
}
