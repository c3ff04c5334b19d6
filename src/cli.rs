use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "devops-validator-install",
    version,
    about = "Install the devops-validator binary from its GitHub releases"
)]
pub struct Args {
    /// Path to installer configuration (TOML)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Sub‑commands (install, resolve, locate)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

/// Platform and version selection shared by `install` and `resolve`
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Release version to install (e.g. 1.0.0 or v1.0.0)
    #[arg(long, env = "DEVOPS_VALIDATOR_VERSION")]
    pub version: Option<String>,

    /// Target OS instead of the host (linux, macos/darwin, windows/win32)
    #[arg(long)]
    pub os: Option<String>,

    /// Target architecture instead of the host (x86_64/x64, aarch64/arm64)
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Download, verify and install the release binary (default)
    Install {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory to install the executable into
        #[arg(long, env = "DEVOPS_VALIDATOR_INSTALL_DIR")]
        install_dir: Option<PathBuf>,

        /// Reinstall even if this version is already installed
        #[arg(long)]
        force: bool,

        /// Print the resolved asset and exit without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the release asset and URLs for a platform
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Find the installed binary (Exit 0 = found, 10 = not installed)
    Locate {
        /// Directory the installer put the executable in
        #[arg(long, env = "DEVOPS_VALIDATOR_INSTALL_DIR")]
        install_dir: Option<PathBuf>,

        /// Only check the install directory, skip PATH and common prefixes
        #[arg(long)]
        no_path: bool,
    },
}

impl Cmd {
    /// `install` as if given with no flags, still honouring its env vars
    pub fn default_install() -> Self {
        Args::try_parse_from(["devops-validator-install", "install"])
            .ok()
            .and_then(|args| args.sub)
            .unwrap_or(Cmd::Install {
                target: TargetArgs::default(),
                install_dir: None,
                force: false,
                dry_run: false,
            })
    }

    /// What the command does, for failure messages
    pub fn action(&self) -> &'static str {
        match self {
            Cmd::Install { dry_run: true, .. } | Cmd::Resolve { .. } => "Asset resolution",
            Cmd::Install { .. } => "Installation",
            Cmd::Locate { .. } => "Locating the installed binary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_install() {
        let args = Args::try_parse_from(["devops-validator-install"]).unwrap();
        assert!(args.sub.is_none());
        assert!(matches!(
            Cmd::default_install(),
            Cmd::Install {
                force: false,
                dry_run: false,
                ..
            }
        ));
    }

    #[test]
    fn failures_are_labelled_by_command() {
        let locate = Args::try_parse_from(["devops-validator-install", "locate"]).unwrap();
        assert_eq!(
            locate.sub.map(|c| c.action()),
            Some("Locating the installed binary")
        );
        let resolve = Args::try_parse_from(["devops-validator-install", "resolve"]).unwrap();
        assert_eq!(resolve.sub.map(|c| c.action()), Some("Asset resolution"));
        assert_eq!(Cmd::default_install().action(), "Installation");
    }

    #[test]
    fn install_flags_parse() {
        let args = Args::try_parse_from([
            "devops-validator-install",
            "install",
            "--version",
            "v1.2.3",
            "--os",
            "win32",
            "--install-dir",
            "/tmp/dv",
            "--force",
        ])
        .unwrap();
        match args.sub {
            Some(Cmd::Install {
                target,
                install_dir,
                force,
                dry_run,
            }) => {
                assert_eq!(target.version.as_deref(), Some("v1.2.3"));
                assert_eq!(target.os.as_deref(), Some("win32"));
                assert_eq!(install_dir, Some(PathBuf::from("/tmp/dv")));
                assert!(force);
                assert!(!dry_run);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
