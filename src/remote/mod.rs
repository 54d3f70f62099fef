//! Remote build host transport
//!
//! Abstracts SSH command execution and SFTP-style file transfer against
//! the ephemeral build host. Provides:
//! - RemoteSession trait: exec/put/get/mkdir/chdir contract
//! - SshHostConfig: connection parameters parsed from the generated
//!   per-host ssh config file
//! - SshSession: real transport shelling out to ssh/scp
//! - MockSession: operation-recording mock for tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::RemoteConfig;
use crate::process::{CommandOutput, CommandRunner, ProcessError};

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to provision build host: {0}")]
    ProvisionFailed(String),

    #[error("failed to destroy build host: {0}")]
    DestroyFailed(String),

    #[error("connection config error: {0}")]
    ConnectionConfig(String),

    #[error("remote execution failed with exit code {exit_code}: {detail}")]
    ExecFailed { exit_code: i32, detail: String },

    #[error("file transfer failed for {path}: {detail}")]
    TransferFailed { path: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),
}

/// Connection parameters for one build host, read from the ssh config
/// file that provisioning generates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshHostConfig {
    pub hostname: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
}

impl SshHostConfig {
    /// Parse the `vagrant ssh-config` output format: one `Key value`
    /// pair per line, first occurrence wins.
    pub fn parse(contents: &str) -> Result<Self, TransportError> {
        let mut hostname = None;
        let mut user = None;
        let mut port = None;
        let mut identity_file = None;

        for line in contents.lines() {
            let mut parts = line.trim().splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("").trim().trim_matches('"');

            match key {
                "HostName" if hostname.is_none() => hostname = Some(value.to_string()),
                "User" if user.is_none() => user = Some(value.to_string()),
                "Port" if port.is_none() => {
                    port = Some(value.parse::<u16>().map_err(|_| {
                        TransportError::ConnectionConfig(format!("invalid port '{}'", value))
                    })?)
                }
                "IdentityFile" if identity_file.is_none() => {
                    identity_file = Some(value.to_string())
                }
                _ => {}
            }
        }

        Ok(Self {
            hostname: hostname.ok_or_else(|| {
                TransportError::ConnectionConfig("missing HostName".to_string())
            })?,
            user: user
                .ok_or_else(|| TransportError::ConnectionConfig("missing User".to_string()))?,
            port: port.unwrap_or(22),
            identity_file,
        })
    }

    /// Load from the generated config file
    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

/// SFTP-style session against one remote host
///
/// The session tracks a remote working directory; relative paths in
/// put/get/mkdir resolve against it.
pub trait RemoteSession {
    /// Execute a command remotely, capturing output
    fn exec(&self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Upload a local file to `name` under the remote working directory
    fn put(&mut self, local: &Path, name: &str) -> Result<(), TransportError>;

    /// Download a remote file (relative to the working directory) to a
    /// local path
    fn get(&mut self, name: &str, local: &Path) -> Result<(), TransportError>;

    /// Create a directory under the remote working directory
    fn mkdir(&mut self, name: &str) -> Result<(), TransportError>;

    /// Change the remote working directory. Absolute paths replace it;
    /// `..` pops one component; other names push.
    fn chdir(&mut self, dir: &str);

    /// Current remote working directory
    fn cwd(&self) -> PathBuf;
}

/// Production session shelling out to ssh/scp
pub struct SshSession<'a> {
    runner: &'a dyn CommandRunner,
    host: SshHostConfig,
    remote: RemoteConfig,
    cwd: PathBuf,
}

impl<'a> SshSession<'a> {
    pub fn new(runner: &'a dyn CommandRunner, host: SshHostConfig, remote: RemoteConfig) -> Self {
        let cwd = PathBuf::from(&remote.remote_home);
        Self {
            runner,
            host,
            remote,
            cwd,
        }
    }

    fn ssh_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.remote.connect_timeout_seconds),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.remote.channel_timeout_seconds),
            "-p".to_string(),
            self.host.port.to_string(),
        ];
        if let Some(ref identity) = self.host.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.host.user, self.host.hostname)
    }

    fn remote_path(&self, name: &str) -> PathBuf {
        if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            self.cwd.join(name)
        }
    }
}

impl RemoteSession for SshSession<'_> {
    fn exec(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let mut args = self.ssh_base_args();
        args.push(self.destination());
        args.push(command.to_string());
        let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();

        let output = self.runner.run("ssh", &arg_refs, Path::new("."))?;
        Ok(output)
    }

    fn put(&mut self, local: &Path, name: &str) -> Result<(), TransportError> {
        // scp uses -P for the port, unlike ssh
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.remote.connect_timeout_seconds),
            "-P".to_string(),
            self.host.port.to_string(),
        ];
        if let Some(ref identity) = self.host.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(local.to_string_lossy().into_owned());
        args.push(format!(
            "{}:{}",
            self.destination(),
            self.remote_path(name).display()
        ));
        let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();

        let output = self.runner.run("scp", &arg_refs, Path::new("."))?;
        if !output.success() {
            return Err(TransportError::TransferFailed {
                path: local.display().to_string(),
                detail: output.combined(),
            });
        }
        Ok(())
    }

    fn get(&mut self, name: &str, local: &Path) -> Result<(), TransportError> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.remote.connect_timeout_seconds),
            "-P".to_string(),
            self.host.port.to_string(),
        ];
        if let Some(ref identity) = self.host.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(format!(
            "{}:{}",
            self.destination(),
            self.remote_path(name).display()
        ));
        args.push(local.to_string_lossy().into_owned());
        let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();

        let output = self.runner.run("scp", &arg_refs, Path::new("."))?;
        if !output.success() {
            return Err(TransportError::TransferFailed {
                path: name.to_string(),
                detail: output.combined(),
            });
        }
        Ok(())
    }

    fn mkdir(&mut self, name: &str) -> Result<(), TransportError> {
        let path = self.remote_path(name);
        let output = self.exec(&format!("mkdir -p '{}'", path.display()))?;
        if !output.success() {
            return Err(TransportError::TransferFailed {
                path: path.display().to_string(),
                detail: output.combined(),
            });
        }
        Ok(())
    }

    fn chdir(&mut self, dir: &str) {
        if Path::new(dir).is_absolute() {
            self.cwd = PathBuf::from(dir);
        } else if dir == ".." {
            self.cwd.pop();
        } else {
            self.cwd.push(dir);
        }
    }

    fn cwd(&self) -> PathBuf {
        self.cwd.clone()
    }
}

/// One operation recorded by a MockSession
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Exec(String),
    Put { local: PathBuf, remote: PathBuf },
    Get { remote: PathBuf, local: PathBuf },
    Mkdir(PathBuf),
    Chdir(PathBuf),
}

/// Recording session for tests; downloads create empty local files so
/// staging paths exist afterwards.
pub struct MockSession {
    ops: Mutex<Vec<RemoteOp>>,
    cwd: PathBuf,
    exec_exit_code: i32,
}

impl MockSession {
    pub fn new(remote_home: &str) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            cwd: PathBuf::from(remote_home),
            exec_exit_code: 0,
        }
    }

    /// Session whose exec() reports the given exit code
    pub fn with_exec_exit_code(mut self, code: i32) -> Self {
        self.exec_exit_code = code;
        self
    }

    pub fn ops(&self) -> Vec<RemoteOp> {
        self.ops.lock().unwrap().clone()
    }
}

impl RemoteSession for MockSession {
    fn exec(&self, command: &str) -> Result<CommandOutput, TransportError> {
        self.ops
            .lock()
            .unwrap()
            .push(RemoteOp::Exec(command.to_string()));
        Ok(CommandOutput {
            exit_code: self.exec_exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn put(&mut self, local: &Path, name: &str) -> Result<(), TransportError> {
        let remote = self.cwd.join(name);
        self.ops.lock().unwrap().push(RemoteOp::Put {
            local: local.to_path_buf(),
            remote,
        });
        Ok(())
    }

    fn get(&mut self, name: &str, local: &Path) -> Result<(), TransportError> {
        let remote = self.cwd.join(name);
        self.ops.lock().unwrap().push(RemoteOp::Get {
            remote,
            local: local.to_path_buf(),
        });
        fs::write(local, [])?;
        Ok(())
    }

    fn mkdir(&mut self, name: &str) -> Result<(), TransportError> {
        let path = self.cwd.join(name);
        self.ops.lock().unwrap().push(RemoteOp::Mkdir(path));
        Ok(())
    }

    fn chdir(&mut self, dir: &str) {
        if Path::new(dir).is_absolute() {
            self.cwd = PathBuf::from(dir);
        } else if dir == ".." {
            self.cwd.pop();
        } else {
            self.cwd.push(dir);
        }
        self.ops.lock().unwrap().push(RemoteOp::Chdir(self.cwd.clone()));
    }

    fn cwd(&self) -> PathBuf {
        self.cwd.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockRunner;

    const SAMPLE_SSH_CONFIG: &str = "\
Host default\n\
  HostName 127.0.0.1\n\
  User vagrant\n\
  Port 2222\n\
  UserKnownHostsFile /dev/null\n\
  StrictHostKeyChecking no\n\
  IdentityFile \"/home/builder/.vagrant.d/insecure_private_key\"\n";

    #[test]
    fn test_parse_ssh_config() {
        let config = SshHostConfig::parse(SAMPLE_SSH_CONFIG).unwrap();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.user, "vagrant");
        assert_eq!(config.port, 2222);
        assert_eq!(
            config.identity_file.as_deref(),
            Some("/home/builder/.vagrant.d/insecure_private_key")
        );
    }

    #[test]
    fn test_parse_ssh_config_default_port() {
        let config = SshHostConfig::parse("HostName h\nUser u\n").unwrap();
        assert_eq!(config.port, 22);
        assert!(config.identity_file.is_none());
    }

    #[test]
    fn test_parse_ssh_config_missing_host() {
        let err = SshHostConfig::parse("User u\n").unwrap_err();
        assert!(matches!(err, TransportError::ConnectionConfig(_)));
    }

    #[test]
    fn test_ssh_session_exec_args() {
        let runner = MockRunner::new();
        let host = SshHostConfig::parse(SAMPLE_SSH_CONFIG).unwrap();
        let session = SshSession::new(&runner, host, RemoteConfig::default());

        session.exec("ls unsigned").unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, "ssh");
        assert!(calls[0].args.contains(&"vagrant@127.0.0.1".to_string()));
        assert!(calls[0].args.contains(&"ConnectTimeout=10".to_string()));
        assert!(calls[0].args.contains(&"ServerAliveInterval=15".to_string()));
        assert!(calls[0].args.contains(&"ls unsigned".to_string()));
    }

    #[test]
    fn test_ssh_session_chdir_tracking() {
        let runner = MockRunner::new();
        let host = SshHostConfig::parse(SAMPLE_SSH_CONFIG).unwrap();
        let mut session = SshSession::new(&runner, host, RemoteConfig::default());

        assert_eq!(session.cwd(), PathBuf::from("/home/vagrant"));
        session.chdir("build");
        session.chdir("extlib");
        assert_eq!(session.cwd(), PathBuf::from("/home/vagrant/build/extlib"));
        session.chdir("..");
        assert_eq!(session.cwd(), PathBuf::from("/home/vagrant/build"));
        session.chdir("/home/vagrant/unsigned");
        assert_eq!(session.cwd(), PathBuf::from("/home/vagrant/unsigned"));
    }

    #[test]
    fn test_ssh_session_put_failure() {
        let runner = MockRunner::new();
        runner.script_fail("scp", 1, "lost connection");

        let host = SshHostConfig::parse(SAMPLE_SSH_CONFIG).unwrap();
        let mut session = SshSession::new(&runner, host, RemoteConfig::default());

        let err = session.put(Path::new("/tmp/f"), "f").unwrap_err();
        assert!(matches!(err, TransportError::TransferFailed { .. }));
    }

    #[test]
    fn test_mock_session_records_ops() {
        let mut session = MockSession::new("/home/vagrant");
        session.mkdir("metadata").unwrap();
        session.chdir("metadata");
        session.exec("echo hi").unwrap();

        let ops = session.ops();
        assert_eq!(ops[0], RemoteOp::Mkdir(PathBuf::from("/home/vagrant/metadata")));
        assert_eq!(ops[1], RemoteOp::Chdir(PathBuf::from("/home/vagrant/metadata")));
        assert_eq!(ops[2], RemoteOp::Exec("echo hi".to_string()));
    }
}
