//! Atomic promotion of a verified executable into its install directory
//!
//! The staged executable is copied into a temp file that lives in the *target*
//! directory, made executable, synced, and then renamed over the final path.
//! Rename within one directory is atomic, so a wrapper running concurrently sees
//! either the old binary or the new one, never a partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::download::checksum::sha256_file;
use super::error::InstallerError;

/// Permission bits of the installed executable
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Filename of the install receipt kept next to the binary
pub const RECEIPT_FILE: &str = ".devops-validator.receipt.json";

/// Where the executable ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub dir: PathBuf,
    pub path: PathBuf,
    pub mode: u32,
}

impl InstallTarget {
    pub fn new(dir: impl Into<PathBuf>, executable_name: &str) -> Self {
        let dir = dir.into();
        let path = dir.join(executable_name);
        Self {
            dir,
            path,
            mode: EXECUTABLE_MODE,
        }
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.dir.join(RECEIPT_FILE)
    }
}

/// Record of a completed install, stored as JSON beside the executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub version: String,
    pub asset: String,
    pub archive_sha256: String,
    pub binary_sha256: String,
    pub installed_at: DateTime<Utc>,
}

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub path: PathBuf,
    pub version: String,
    pub asset: String,
    pub archive_sha256: String,
    pub binary_sha256: String,
    /// A previous binary existed at the target and was replaced
    pub replaced: bool,
    /// The requested version was already installed intact; nothing was written
    pub already_installed: bool,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> InstallerError + use<> {
    let path = path.to_path_buf();
    move |e| InstallerError::from_io(path, e)
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Promote `staged` to `target.path` with a single rename.
///
/// `cancel` is honoured up to the rename; once the rename has happened the
/// promotion is complete and is never reported as cancelled.
///
/// Returns the SHA-256 of the installed executable and whether a previous
/// binary was replaced.
pub fn install_executable(
    staged: &Path,
    target: &InstallTarget,
    cancel: &CancellationToken,
) -> Result<(String, bool), InstallerError> {
    if cancel.is_cancelled() {
        return Err(InstallerError::Cancelled);
    }
    fs::create_dir_all(&target.dir).map_err(io_err(&target.dir))?;

    let mut source = fs::File::open(staged).map_err(io_err(staged))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".devops-validator.")
        .suffix(".new")
        .tempfile_in(&target.dir)
        .map_err(io_err(&target.dir))?;

    std::io::copy(&mut source, temp.as_file_mut()).map_err(io_err(temp.path()))?;
    temp.as_file_mut().flush().map_err(io_err(temp.path()))?;
    set_mode(temp.as_file(), target.mode).map_err(io_err(temp.path()))?;
    temp.as_file().sync_all().map_err(io_err(temp.path()))?;

    let binary_sha256 = sha256_file(temp.path()).map_err(io_err(temp.path()))?;
    let replaced = target.path.exists();

    // Nothing at the target has changed yet; the temp file is removed on drop
    if cancel.is_cancelled() {
        debug!("Cancelled before promoting {}", temp.path().display());
        return Err(InstallerError::Cancelled);
    }
    debug!(
        "Renaming {} -> {}",
        temp.path().display(),
        target.path.display()
    );
    temp.persist(&target.path)
        .map_err(|e| InstallerError::from_io(&target.path, e.error))?;

    info!(
        "Installed {} (sha256 {binary_sha256}{})",
        target.path.display(),
        if replaced { ", replaced previous binary" } else { "" }
    );
    Ok((binary_sha256, replaced))
}

/// Atomically write the receipt next to the installed binary
pub fn write_receipt(target: &InstallTarget, receipt: &InstallReceipt) -> Result<(), InstallerError> {
    let receipt_path = target.receipt_path();
    let json = serde_json::to_vec_pretty(receipt)
        .map_err(|e| InstallerError::Config(format!("cannot serialize install receipt: {e}")))?;

    let mut temp = tempfile::NamedTempFile::new_in(&target.dir)
        .map_err(|e| InstallerError::from_io(&target.dir, e))?;
    temp.write_all(&json)
        .map_err(|e| InstallerError::from_io(temp.path(), e))?;
    temp.persist(&receipt_path)
        .map_err(|e| InstallerError::from_io(&receipt_path, e.error))?;
    Ok(())
}

/// Read the receipt, treating a missing or unreadable one as absent
pub fn read_receipt(target: &InstallTarget) -> Option<InstallReceipt> {
    let raw = fs::read(target.receipt_path()).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(receipt) => Some(receipt),
        Err(e) => {
            log::warn!("Ignoring unreadable install receipt: {e}");
            None
        }
    }
}

/// Whether `version` is installed and the binary still matches its receipt
pub fn installed_intact(target: &InstallTarget, version: &str) -> Option<InstallReceipt> {
    let receipt = read_receipt(target)?;
    if receipt.version != version {
        return None;
    }
    let actual = sha256_file(&target.path).ok()?;
    (actual == receipt.binary_sha256).then_some(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("staged-bin");
        fs::write(&path, data).unwrap();
        path
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn installs_into_fresh_directory() {
        let staging = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path().join("nested/bin"), "devops-validator");

        let (digest, replaced) =
            install_executable(&staged(staging.path(), b"v1"), &target, &no_cancel()).unwrap();

        assert!(!replaced);
        assert_eq!(fs::read(&target.path).unwrap(), b"v1");
        assert_eq!(digest, crate::install::download::checksum::sha256_hex(b"v1"));
    }

    #[cfg(unix)]
    #[test]
    fn installed_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let staging = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        install_executable(&staged(staging.path(), b"v1"), &target, &no_cancel()).unwrap();

        let mode = fs::metadata(&target.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn replaces_existing_binary_without_leftovers() {
        let staging = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        fs::write(&target.path, b"old").unwrap();

        let (_, replaced) =
            install_executable(&staged(staging.path(), b"new"), &target, &no_cancel()).unwrap();

        assert!(replaced);
        assert_eq!(fs::read(&target.path).unwrap(), b"new");
        let names: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["devops-validator".to_string()]);
    }

    #[test]
    fn missing_staged_file_keeps_existing_binary() {
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        fs::write(&target.path, b"old").unwrap();

        let err =
            install_executable(&root.path().join("nope"), &target, &no_cancel()).unwrap_err();

        assert_eq!(err.kind(), "FilesystemError");
        assert_eq!(fs::read(&target.path).unwrap(), b"old");
    }

    #[test]
    fn cancelled_promotion_keeps_existing_binary() {
        let staging = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        fs::write(&target.path, b"old").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = install_executable(&staged(staging.path(), b"new"), &target, &cancel)
            .unwrap_err();

        assert!(matches!(err, InstallerError::Cancelled));
        assert_eq!(fs::read(&target.path).unwrap(), b"old");
        let names: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["devops-validator".to_string()]);
    }

    #[test]
    fn receipt_round_trip_and_tamper_detection() {
        let staging = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        let (digest, _) =
            install_executable(&staged(staging.path(), b"v1"), &target, &no_cancel()).unwrap();

        write_receipt(
            &target,
            &InstallReceipt {
                version: "1.0.0".into(),
                asset: "devops-validator-1.0.0-Linux-x86_64.tar.gz".into(),
                archive_sha256: "ab".into(),
                binary_sha256: digest,
                installed_at: Utc::now(),
            },
        )
        .unwrap();

        assert!(installed_intact(&target, "1.0.0").is_some());
        assert!(installed_intact(&target, "1.0.1").is_none());

        fs::write(&target.path, b"tampered").unwrap();
        assert!(installed_intact(&target, "1.0.0").is_none());
    }

    #[test]
    fn corrupt_receipt_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let target = InstallTarget::new(root.path(), "devops-validator");
        fs::write(target.receipt_path(), b"{not json").unwrap();
        assert!(read_receipt(&target).is_none());
    }
}
