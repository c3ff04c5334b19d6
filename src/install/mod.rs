//! devops-validator release installation
//!
//! Resolves the release asset for a platform, downloads and verifies it, and
//! atomically installs the executable where the npm and python wrappers look
//! for it.
//!
//! One attempt runs `Resolving → Downloading → Verifying → Extracting →
//! Installing → Done`; any stage may end in `Failed`.

pub mod binary_staging;
pub mod detection;
pub mod download;
pub mod error;
pub mod progress;
pub mod runners;

use std::path::PathBuf;

use chrono::Utc;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

pub use binary_staging::{InstallReceipt, InstallResult, InstallTarget};
pub use error::InstallerError;
pub use progress::{InstallPhase, InstallProgress, PhaseTracker, ProgressSink};

use download::{Downloader, PlatformKey, ReleaseSource, resolve_asset};

/// Everything one install attempt needs
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// OS override; `None` uses the host
    pub os: Option<String>,
    /// Architecture override; `None` uses the host
    pub arch: Option<String>,
    pub version: String,
    pub source: ReleaseSource,
    pub install_dir: PathBuf,
    /// Reinstall even when the requested version is already installed intact
    pub force: bool,
}

/// Run one install attempt, aborting cleanly if `cancel` fires.
///
/// Cancellation is honoured until the final rename of the executable. Before
/// that the staging directory is removed and the binary at the install target
/// (if any) is left untouched; after it the install completes normally.
pub async fn install_release(
    request: &InstallRequest,
    downloader: &Downloader,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<InstallResult, InstallerError> {
    let mut tracker = PhaseTracker::default();

    let outcome = run_stages(request, downloader, &mut tracker, progress, cancel).await;

    if let Err(e) = &outcome {
        let failed = InstallPhase::Failed(e.kind().to_string());
        tracker.advance(failed.clone());
        progress.phase(failed, e.to_string());
    }
    outcome
}

async fn run_stages(
    request: &InstallRequest,
    downloader: &Downloader,
    tracker: &mut PhaseTracker,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<InstallResult, InstallerError> {
    if cancel.is_cancelled() {
        return Err(InstallerError::Cancelled);
    }
    progress.phase(InstallPhase::Resolving, "Resolving release asset");
    let platform = PlatformKey::resolve(request.os.as_deref(), request.arch.as_deref())?;
    let asset = resolve_asset(&platform, &request.version, &request.source)?;
    let version = asset.version.to_string();
    info!("Resolved {platform} v{version} to {}", asset.url);

    let target = InstallTarget::new(&request.install_dir, &asset.executable_name);

    if !request.force
        && let Some(receipt) = binary_staging::installed_intact(&target, &version)
    {
        info!(
            "{} v{version} already installed at {}",
            asset.executable_name,
            target.path.display()
        );
        return Ok(InstallResult {
            path: target.path,
            version,
            asset: receipt.asset,
            archive_sha256: receipt.archive_sha256,
            binary_sha256: receipt.binary_sha256,
            replaced: false,
            already_installed: true,
        });
    }

    // Dropped on every exit path, taking partial downloads with it
    let staging = tempfile::Builder::new()
        .prefix(".devops-validator-staging-")
        .tempdir()
        .map_err(|e| InstallerError::from_io(std::env::temp_dir(), e))?;

    let verified = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(InstallerError::Cancelled),
        verified = downloader.fetch_and_verify(&asset, staging.path(), tracker, progress) => verified?,
    };

    tracker.advance(InstallPhase::Installing);
    progress.phase(
        InstallPhase::Installing,
        format!("Installing to {}", target.path.display()),
    );
    // Awaited to completion: the promotion itself decides whether it was cancelled
    let staged = verified.executable_path.clone();
    let install_target = target.clone();
    let promote_cancel = cancel.clone();
    let (binary_sha256, replaced) = tokio::task::spawn_blocking(move || {
        binary_staging::install_executable(&staged, &install_target, &promote_cancel)
    })
    .await
    .map_err(|e| {
        InstallerError::from_io(&target.path, std::io::Error::other(e.to_string()))
    })??;

    let receipt = InstallReceipt {
        version: version.clone(),
        asset: asset.file_name.clone(),
        archive_sha256: verified.archive_sha256.clone(),
        binary_sha256: binary_sha256.clone(),
        installed_at: Utc::now(),
    };
    if let Err(e) = binary_staging::write_receipt(&target, &receipt) {
        warn!(
            "Installed {} but could not record the install receipt: {e}",
            target.path.display()
        );
    }

    tracker.advance(InstallPhase::Done);
    progress.phase(
        InstallPhase::Done,
        format!("Installed {} v{version}", asset.executable_name),
    );

    Ok(InstallResult {
        path: target.path,
        version,
        asset: asset.file_name,
        archive_sha256: verified.archive_sha256,
        binary_sha256,
        replaced,
        already_installed: false,
    })
}
