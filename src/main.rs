use std::path::PathBuf;

use clap::Parser;
use log::debug;

use devops_validator_install::cli::{self, Cmd};
use devops_validator_install::config::InstallerConfig;
use devops_validator_install::install::InstallerError;
use devops_validator_install::install::runners;

fn main() {
    // Initialize logger with custom format
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = cli::Args::parse();
    let cmd = args.sub.unwrap_or_else(Cmd::default_install);
    let action = cmd.action();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main(args.config, cmd)) {
        debug!("{e:?}");
        runners::report_failure(action, &e);
        std::process::exit(e.exit_code());
    }
}

async fn real_main(config: Option<PathBuf>, cmd: Cmd) -> Result<(), InstallerError> {
    let config = InstallerConfig::load(config.as_deref())?;

    match cmd {
        Cmd::Install {
            target,
            install_dir,
            force,
            dry_run,
        } => runners::run_install(&target, install_dir, force, dry_run, &config).await,
        Cmd::Resolve { target } => runners::run_resolve(&target, &config),
        Cmd::Locate {
            install_dir,
            no_path,
        } => runners::run_locate(install_dir, no_path, &config),
    }
}
