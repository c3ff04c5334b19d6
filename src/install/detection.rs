//! Installed-binary detection
//!
//! Mirrors the lookup order the npm and python wrappers use to find the
//! validator: the documented install directory first, then `PATH`, then the
//! usual unix install prefixes.

use std::path::{Path, PathBuf};

use super::binary_staging::{InstallReceipt, InstallTarget, read_receipt};
use super::download::asset::BINARY_NAME;
use super::error::InstallerError;

/// Where an installed binary was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySource {
    /// The installer's own target directory
    InstallDir,
    /// Found through a `PATH` lookup
    SystemPath,
    /// One of the conventional install prefixes
    KnownLocation,
}

#[derive(Debug, Clone)]
pub struct LocatedBinary {
    pub path: PathBuf,
    pub source: BinarySource,
    /// Receipt, when the binary was installed by this tool
    pub receipt: Option<InstallReceipt>,
}

/// Host executable filename (`devops-validator` or `devops-validator.exe`)
pub fn host_executable_name() -> String {
    format!("{BINARY_NAME}{}", std::env::consts::EXE_SUFFIX)
}

/// Conventional install locations checked after `PATH`
fn known_locations() -> Vec<PathBuf> {
    #[cfg(unix)]
    {
        let mut paths = vec![
            PathBuf::from("/usr/local/bin").join(BINARY_NAME),
            PathBuf::from("/usr/bin").join(BINARY_NAME),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".local/bin").join(BINARY_NAME));
        }
        paths
    }

    #[cfg(not(unix))]
    {
        Vec::new()
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Find the binary a wrapper would run
///
/// `path_lookup` controls the `PATH` and well-known location fallbacks; the
/// install directory is always checked first.
pub fn locate_binary(install_dir: &Path, path_lookup: bool) -> Result<LocatedBinary, InstallerError> {
    let target = InstallTarget::new(install_dir, &host_executable_name());
    let mut searched = vec![target.path.clone()];

    if is_executable(&target.path) {
        return Ok(LocatedBinary {
            path: target.path.clone(),
            source: BinarySource::InstallDir,
            receipt: read_receipt(&target),
        });
    }

    if path_lookup {
        match which::which(BINARY_NAME) {
            Ok(path) => {
                return Ok(LocatedBinary {
                    path,
                    source: BinarySource::SystemPath,
                    receipt: None,
                });
            }
            Err(e) => log::debug!("{BINARY_NAME} not on PATH: {e}"),
        }
        searched.push(PathBuf::from("$PATH"));

        for candidate in known_locations() {
            if is_executable(&candidate) {
                return Ok(LocatedBinary {
                    path: candidate,
                    source: BinarySource::KnownLocation,
                    receipt: None,
                });
            }
            searched.push(candidate);
        }
    }

    Err(InstallerError::NotInstalled { searched })
}
