//! apkforge CLI
//!
//! Entry point for the `apkforge` command-line tool.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

use apkforge::batch::{BatchOptions, BatchRunner};
use apkforge::build::RunMode;
use apkforge::config::ForgeConfig;
use apkforge::metadata::load_apps;
use apkforge::process::SystemRunner;
use apkforge::scan::BinaryScanner;
use apkforge::vcs::CliVcs;

#[derive(Parser)]
#[command(name = "apkforge")]
#[command(about = "Batch build engine for unsigned Android packages", version)]
struct Cli {
    /// Spew out even more information than normal
    #[arg(short, long)]
    verbose: bool,

    /// Build only the specified package
    #[arg(short, long)]
    package: Option<String>,

    /// Build only the specified version code of the selected package
    #[arg(short = 'c', long)]
    vercode: Option<String>,

    /// Use with --install, when not using --package, to confirm you
    /// really want to build and install everything
    #[arg(long)]
    all: bool,

    /// Stop the batch after the first failed build
    #[arg(short, long)]
    stop: bool,

    /// Test mode: put output in the tmp directory, re-building
    /// published versions
    #[arg(short, long)]
    test: bool,

    /// Build despite scanner findings and app-level disabled flags
    #[arg(short, long)]
    force: bool,

    /// Build and install a debug version on a connected device
    #[arg(long, conflicts_with = "server")]
    install: bool,

    /// Build on an ephemeral remote host instead of locally
    #[arg(long, conflicts_with = "on_server")]
    server: bool,

    /// Mark this invocation as running on the build host itself
    #[arg(long)]
    on_server: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(1);
        }
    }
}

/// Resolve run-mode flags from the parsed command line, applying the
/// implication and confirmation rules.
fn resolve_mode(cli: &Cli) -> Result<RunMode, String> {
    // Installing implies a forced test build of the selected packages,
    // and installing everything needs explicit confirmation
    if cli.install && cli.package.is_none() && !cli.all {
        return Err("This would build and install everything in the repo to the device.\n\
                    You probably want to use --package and maybe also --vercode.\n\
                    If you really want to install everything, use --all."
            .to_string());
    }
    let force = cli.force || cli.install;
    let test = cli.test || cli.install;

    if force && !test {
        return Err("Force is only allowed in test mode".to_string());
    }

    Ok(RunMode {
        test,
        force,
        install: cli.install,
        // On the build host itself the dispatch is always local
        server: cli.server && !cli.on_server,
        verbose: cli.verbose,
    })
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let mode = resolve_mode(&cli)?;
    let config = ForgeConfig::load_or_default(&cli.config)?;

    fs::create_dir_all(&config.log_dir)?;
    fs::create_dir_all(&config.tmp_dir)?;
    fs::create_dir_all(config.build_dir.join("extlib"))?;
    fs::create_dir_all(config.output_dir(mode.test))?;

    let apps = load_apps(&config.metadata_dir)?;
    if cli.verbose {
        eprintln!("Read metadata for {} apps", apps.len());
    }

    let runner = SystemRunner;
    let vcs = CliVcs::new(&runner);
    let scanner = BinaryScanner::new()?;
    let batch = BatchRunner::new(&config, &runner, &vcs, &scanner);

    let options = BatchOptions {
        package: cli.package,
        vercode: cli.vercode,
        stop_on_failure: cli.stop,
        config_file: cli.config.exists().then(|| cli.config.clone()),
        mode,
    };

    let summary = batch.run(&apps, &options)?;
    print!("{}", summary.to_human());
    summary.write_to_file(&config.log_dir.join("summary.json"))?;

    Ok(if summary.has_failures() { 1 } else { 0 })
}
