//! Remote build flow tests
//!
//! Exercise the session-level remote protocol against the recording
//! session, and the host lifecycle against the mocked process runner.

use std::fs;
use std::path::{Path, PathBuf};

use apkforge::build::{BuildError, RemoteBuilder, RunMode};
use apkforge::config::ForgeConfig;
use apkforge::metadata::{App, BuildSpec};
use apkforge::process::MockRunner;
use apkforge::remote::{MockSession, RemoteOp, TransportError};
use tempfile::TempDir;

fn sample_app() -> App {
    App {
        id: "org.example.clock".to_string(),
        repo: "https://example.com/clock.git".to_string(),
        repo_type: "git".to_string(),
        disabled: false,
        builds: vec![],
    }
}

fn sample_spec() -> BuildSpec {
    BuildSpec {
        version: "2.3".to_string(),
        vercode: "14".to_string(),
        commit: "v2.3".to_string(),
        subdir: None,
        buildjni: None,
        maven: false,
        antcommand: None,
        bindir: None,
        initfun: false,
        novcheck: false,
    }
}

fn fixture_config(base: &Path) -> ForgeConfig {
    let config = ForgeConfig {
        metadata_dir: base.join("metadata"),
        build_dir: base.join("build"),
        tmp_dir: base.join("tmp"),
        unsigned_dir: base.join("unsigned"),
        log_dir: base.join("logs"),
        ..ForgeConfig::default()
    };
    fs::create_dir_all(&config.metadata_dir).unwrap();
    fs::write(
        config.metadata_dir.join("org.example.clock.toml"),
        "id = \"org.example.clock\"\nrepo = \"https://example.com/clock.git\"\nrepo_type = \"git\"\n",
    )
    .unwrap();

    let app_dir = config.app_build_dir("org.example.clock");
    fs::create_dir_all(app_dir.join("res")).unwrap();
    fs::write(app_dir.join("AndroidManifest.xml"), "<manifest/>").unwrap();
    fs::write(app_dir.join("res/strings.xml"), "<resources/>").unwrap();
    fs::create_dir_all(&config.unsigned_dir).unwrap();
    config
}

// =============================================================================
// Protocol order: scaffold, mirror, build, retrieve
// =============================================================================

#[test]
fn test_remote_protocol_order() {
    let dir = TempDir::new().unwrap();
    let config = fixture_config(dir.path());
    let runner = MockRunner::new();
    let builder = RemoteBuilder::new(&config, &runner);

    let mut session = MockSession::new("/home/vagrant");
    builder
        .run_on_host(
            &mut session,
            &sample_app(),
            &sample_spec(),
            RunMode::default(),
            &config.unsigned_dir,
            None,
        )
        .unwrap();

    let ops = session.ops();

    let pos = |needle: &RemoteOp| ops.iter().position(|op| op == needle).unwrap();
    let scaffold = pos(&RemoteOp::Mkdir(PathBuf::from("/home/vagrant/metadata")));
    let mirror = ops
        .iter()
        .position(|op| {
            matches!(op, RemoteOp::Put { remote, .. }
                if *remote == PathBuf::from("/home/vagrant/build/org.example.clock/AndroidManifest.xml"))
        })
        .unwrap();
    let exec = ops
        .iter()
        .position(|op| matches!(op, RemoteOp::Exec(_)))
        .unwrap();
    let retrieve = ops
        .iter()
        .position(|op| matches!(op, RemoteOp::Get { .. }))
        .unwrap();

    assert!(scaffold < mirror);
    assert!(mirror < exec);
    assert!(exec < retrieve);

    // The build runs scoped to exactly this app and version code
    if let RemoteOp::Exec(cmd) = &ops[exec] {
        assert!(cmd.contains("-p org.example.clock"));
        assert!(cmd.contains("-c 14"));
        assert!(cmd.contains("--on-server"));
    }

    // Both outputs land locally
    assert!(config.unsigned_dir.join("org.example.clock_14.apk").is_file());
    assert!(config
        .unsigned_dir
        .join("org.example.clock_14_src.tar.gz")
        .is_file());
}

// =============================================================================
// Nested directories mirror depth-first with cwd restored per subtree
// =============================================================================

#[test]
fn test_mirror_restores_working_directory_per_subtree() {
    let dir = TempDir::new().unwrap();
    let config = fixture_config(dir.path());
    let app_dir = config.app_build_dir("org.example.clock");
    fs::create_dir_all(app_dir.join("src/org/example")).unwrap();
    fs::write(app_dir.join("src/org/example/Clock.java"), "class Clock {}").unwrap();

    let runner = MockRunner::new();
    let builder = RemoteBuilder::new(&config, &runner);

    let mut session = MockSession::new("/home/vagrant");
    builder
        .run_on_host(
            &mut session,
            &sample_app(),
            &sample_spec(),
            RunMode::default(),
            &config.unsigned_dir,
            None,
        )
        .unwrap();

    let puts: Vec<PathBuf> = session
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            RemoteOp::Put { remote, .. } => Some(remote),
            _ => None,
        })
        .collect();

    let root = PathBuf::from("/home/vagrant/build/org.example.clock");
    assert!(puts.contains(&root.join("src/org/example/Clock.java")));
    // The top-level file goes up after the subtree, from the tree root
    assert!(puts.contains(&root.join("AndroidManifest.xml")));
    assert!(puts.contains(&root.join("res/strings.xml")));
}

// =============================================================================
// A failed remote build surfaces its exit code and fetches nothing
// =============================================================================

#[test]
fn test_remote_build_failure_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let config = fixture_config(dir.path());
    let runner = MockRunner::new();
    let builder = RemoteBuilder::new(&config, &runner);

    let mut session = MockSession::new("/home/vagrant").with_exec_exit_code(2);
    let err = builder
        .run_on_host(
            &mut session,
            &sample_app(),
            &sample_spec(),
            RunMode::default(),
            &config.unsigned_dir,
            None,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::Remote(TransportError::ExecFailed { exit_code: 2, .. })
    ));
    assert!(!session
        .ops()
        .iter()
        .any(|op| matches!(op, RemoteOp::Get { .. })));
    assert!(!config.unsigned_dir.join("org.example.clock_14.apk").exists());
}

// =============================================================================
// Host lifecycle: provision, build, destroy, in that order, always
// =============================================================================

#[test]
fn test_host_destroyed_even_when_transport_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = fixture_config(dir.path());
    config.remote.builder_dir = dir.path().join("builder");
    fs::create_dir_all(&config.remote.builder_dir).unwrap();

    let runner = MockRunner::new();
    runner.script_ok("vagrant", ""); // up
    runner.script_ok("vagrant", "HostName 127.0.0.1\nUser vagrant\nPort 2222\n");
    runner.script_fail("ssh", 255, "Connection timed out");
    runner.script_ok("vagrant", ""); // destroy

    let builder = RemoteBuilder::new(&config, &runner);
    let err = builder
        .build(
            &sample_app(),
            &sample_spec(),
            RunMode::default(),
            &config.unsigned_dir,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, BuildError::Remote(_)));

    let vagrant_args: Vec<Vec<String>> = runner
        .calls()
        .into_iter()
        .filter(|c| c.program == "vagrant")
        .map(|c| c.args)
        .collect();
    assert_eq!(vagrant_args.last().unwrap(), &vec!["destroy".to_string(), "-f".to_string()]);
}
