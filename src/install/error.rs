//! Installer error taxonomy
//!
//! Every failure the install pipeline can surface maps to exactly one variant
//! here. Variants carry enough context (asset name, expected vs. actual digest,
//! offending path) to diagnose a failure without re-running the installer.

use std::path::PathBuf;

use thiserror::Error;

/// Fallback advice printed alongside every failure
pub const FALLBACK_HINT: &str = "build from source or use a native package manager";

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("network error fetching {url}: {message}")]
    Network {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("archive error in {asset}: {message}")]
    Archive { asset: String, message: String },

    #[error("permission denied: {}: {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem error: {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("devops-validator is not installed (looked in {})", searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    NotInstalled { searched: Vec<PathBuf> },

    #[error("installation cancelled")]
    Cancelled,
}

impl InstallerError {
    /// Map an I/O error on `path` to `PermissionDenied` or `Filesystem`
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path, source }
        } else {
            Self::Filesystem { path, source }
        }
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn archive(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Archive {
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Whether the download stage may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { retryable: true, .. })
    }

    /// Stable name of the failure kind, printed before the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform { .. } => "UnsupportedPlatform",
            Self::InvalidVersion { .. } => "InvalidVersion",
            Self::Network { .. } => "NetworkError",
            Self::ChecksumMismatch { .. } => "ChecksumMismatch",
            Self::Archive { .. } => "ArchiveError",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::Filesystem { .. } => "FilesystemError",
            Self::Config(_) => "ConfigError",
            Self::NotInstalled { .. } => "NotInstalled",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Process exit code, distinct per failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnsupportedPlatform { .. } => 2,
            Self::InvalidVersion { .. } => 3,
            Self::Network { .. } => 4,
            Self::ChecksumMismatch { .. } => 5,
            Self::Archive { .. } => 6,
            Self::PermissionDenied { .. } => 7,
            Self::Filesystem { .. } => 8,
            Self::Config(_) => 9,
            Self::NotInstalled { .. } => 10,
            Self::Cancelled => 130,
        }
    }

    /// Human-readable next step for the user
    pub fn remediation(&self) -> String {
        match self {
            Self::UnsupportedPlatform { .. } => {
                format!("no prebuilt release exists for this platform; {FALLBACK_HINT}")
            }
            Self::InvalidVersion { .. } => {
                format!("pass a semantic version such as 1.0.0, or {FALLBACK_HINT}")
            }
            Self::Network { .. } => {
                format!("check your network connection and retry, or {FALLBACK_HINT}")
            }
            Self::ChecksumMismatch { .. } => format!(
                "the download was corrupted or tampered with and has been discarded; \
                 retry later or {FALLBACK_HINT}"
            ),
            Self::Archive { .. } => {
                format!("the release archive is malformed; {FALLBACK_HINT}")
            }
            Self::PermissionDenied { .. } => {
                "choose a writable --install-dir or re-run with sufficient privileges".to_string()
            }
            Self::Filesystem { .. } => {
                "check free disk space and that the install directory is writable".to_string()
            }
            Self::Config(_) => "fix the installer configuration file or flags".to_string(),
            Self::NotInstalled { .. } => {
                "run `devops-validator-install install` first".to_string()
            }
            Self::Cancelled => "no changes were made to the installed binary".to_string(),
        }
    }
}
