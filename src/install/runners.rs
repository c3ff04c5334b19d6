//! Command runners for the installer CLI (install, resolve, locate)
//!
//! Status lines go to stdout through termcolor, byte progress to stderr through
//! an indicatif bar, and failures print their kind plus a remediation hint.

use std::io::Write;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::detection::{BinarySource, locate_binary};
use super::download::{Downloader, PlatformKey, resolve_asset};
use super::error::InstallerError;
use super::progress::{InstallPhase, InstallProgress, ProgressSink};
use super::{InstallRequest, install_release};
use crate::cli::TargetArgs;
use crate::config::InstallerConfig;

fn color_choice() -> ColorChoice {
    use std::io::IsTerminal;
    if std::io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn print_colored(stdout: &mut StandardStream, color: Color, bold: bool, line: &str) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.reset();
}

/// Print a failure of `action` with its kind and remediation hint to stderr
pub fn report_failure(action: &str, err: &InstallerError) {
    let mut stderr = StandardStream::stderr(color_choice());
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "❌ {action} failed [{}]", err.kind());
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {err}");
    let _ = writeln!(stderr, "   hint: {}", err.remediation());
}

fn version_or_default(target: &TargetArgs, config: &InstallerConfig) -> String {
    target
        .version
        .clone()
        .unwrap_or_else(|| config.version.clone())
}

/// Print the platform, asset and URLs without touching the network
pub fn run_resolve(target: &TargetArgs, config: &InstallerConfig) -> Result<(), InstallerError> {
    let platform = PlatformKey::resolve(target.os.as_deref(), target.arch.as_deref())?;
    let asset = resolve_asset(
        &platform,
        &version_or_default(target, config),
        &config.release_source(),
    )?;

    let mut stdout = StandardStream::stdout(color_choice());
    let _ = writeln!(stdout, "Platform: {platform}");
    let _ = writeln!(stdout, "Version: {}", asset.version);
    let _ = writeln!(stdout, "Asset: {}", asset.file_name);
    let _ = writeln!(stdout, "URL: {}", asset.url);
    let _ = writeln!(stdout, "Checksum: {}", asset.checksum_url);
    let _ = writeln!(stdout, "Executable: {}", asset.executable_name);
    Ok(())
}

/// Print the binary a wrapper would execute
pub fn run_locate(
    install_dir: Option<PathBuf>,
    no_path: bool,
    config: &InstallerConfig,
) -> Result<(), InstallerError> {
    let dir = match install_dir {
        Some(dir) => dir,
        None => config.resolve_install_dir()?,
    };
    let found = locate_binary(&dir, !no_path)?;

    let mut stdout = StandardStream::stdout(color_choice());
    let _ = writeln!(stdout, "{}", found.path.display());
    let origin = match found.source {
        BinarySource::InstallDir => "install directory",
        BinarySource::SystemPath => "PATH",
        BinarySource::KnownLocation => "system location",
    };
    match found.receipt {
        Some(receipt) => log::info!(
            "Found in {origin}: v{} from {} (installed {})",
            receipt.version,
            receipt.asset,
            receipt.installed_at
        ),
        None => log::info!("Found in {origin}"),
    }
    Ok(())
}

/// Render progress events until the channel closes
fn spawn_progress_printer(mut rx: mpsc::Receiver<InstallProgress>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;

        while let Some(progress) = rx.recv().await {
            match progress {
                InstallProgress::Phase { phase, message } => {
                    if let Some(b) = bar.take() {
                        b.finish_and_clear();
                    }
                    let icon = match phase {
                        InstallPhase::Resolving => "🔍",
                        InstallPhase::Downloading => "📥",
                        InstallPhase::Verifying => "🔐",
                        InstallPhase::Extracting => "📦",
                        InstallPhase::Installing => "🔧",
                        InstallPhase::Done => "✅",
                        InstallPhase::Failed(_) => continue,
                    };
                    eprintln!("{icon} {message}");
                }
                InstallProgress::Bytes {
                    downloaded,
                    total_bytes,
                    ..
                } => {
                    let b = bar.get_or_insert_with(|| {
                        let b = ProgressBar::new(total_bytes);
                        if total_bytes > 0 {
                            b.set_style(
                                ProgressStyle::with_template(
                                    "   {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
                                )
                                .unwrap_or_else(|_| ProgressStyle::default_bar()),
                            );
                        } else {
                            b.set_style(ProgressStyle::default_spinner());
                        }
                        b
                    });
                    b.set_position(downloaded);
                }
                InstallProgress::Retry {
                    attempt,
                    max_attempts,
                    delay_ms,
                    reason,
                } => {
                    if let Some(b) = bar.take() {
                        b.abandon();
                    }
                    eprintln!(
                        "⚠️  Attempt {attempt}/{max_attempts} failed ({reason}); retrying in {delay_ms}ms"
                    );
                }
            }
        }

        if let Some(b) = bar {
            b.finish_and_clear();
        }
    })
}

/// Install the requested release, cancelling cleanly on Ctrl-C
pub async fn run_install(
    target: &TargetArgs,
    install_dir: Option<PathBuf>,
    force: bool,
    dry_run: bool,
    config: &InstallerConfig,
) -> Result<(), InstallerError> {
    let mut stdout = StandardStream::stdout(color_choice());
    print_colored(&mut stdout, Color::Cyan, true, "🔧 devops-validator installation");

    if dry_run {
        return run_resolve(target, config);
    }

    let install_dir = match install_dir {
        Some(dir) => dir,
        None => config.resolve_install_dir()?,
    };
    let request = InstallRequest {
        os: target.os.clone(),
        arch: target.arch.clone(),
        version: version_or_default(target, config),
        source: config.release_source(),
        install_dir,
        force,
    };
    let downloader = Downloader::new(config.download_settings())?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling installation");
            signal_token.cancel();
        }
    });

    let (tx, rx) = mpsc::channel::<InstallProgress>(100);
    let printer = spawn_progress_printer(rx);
    let outcome = install_release(&request, &downloader, &ProgressSink::new(tx), &cancel).await;

    // Sink dropped above; printer drains and exits
    printer.await.ok();
    signal_task.abort();

    let result = outcome?;
    if result.already_installed {
        print_colored(
            &mut stdout,
            Color::Green,
            true,
            &format!("✓ v{} already installed", result.version),
        );
    } else {
        print_colored(
            &mut stdout,
            Color::Green,
            true,
            &format!("\n✅ Installed devops-validator v{}", result.version),
        );
        let _ = writeln!(stdout, "   Asset: {}", result.asset);
        let _ = writeln!(stdout, "   SHA-256: {}", result.archive_sha256);
        if result.replaced {
            let _ = writeln!(stdout, "   Replaced previous binary");
        }
    }
    let _ = writeln!(stdout, "   Binary: {}", result.path.display());
    Ok(())
}
