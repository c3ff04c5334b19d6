//! Release asset naming
//!
//! The mapping from platform to asset filename is a const table so every
//! supported combination can be enumerated and tested in isolation.

use super::platform::{Arch, Os, PlatformKey};
use crate::install::error::InstallerError;

/// Prefix shared by every release asset and by the installed executable
pub const BINARY_NAME: &str = "devops-validator";

/// Suffix appended to an asset URL to locate its published SHA-256 digest
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Container format of a release asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

/// One row of the asset table
#[derive(Debug, Clone, Copy)]
pub struct AssetRule {
    pub os: Os,
    /// `None` matches any architecture
    pub arch: Option<Arch>,
    /// Platform label placed after the version in the filename
    pub label: &'static str,
    pub archive: ArchiveKind,
}

pub const ASSET_TABLE: &[AssetRule] = &[
    AssetRule {
        os: Os::Linux,
        arch: Some(Arch::X86_64),
        label: "Linux-x86_64",
        archive: ArchiveKind::TarGz,
    },
    AssetRule {
        os: Os::Linux,
        arch: Some(Arch::Aarch64),
        label: "Linux-aarch64",
        archive: ArchiveKind::TarGz,
    },
    AssetRule {
        os: Os::MacOs,
        arch: None,
        label: "macOS",
        archive: ArchiveKind::TarGz,
    },
    AssetRule {
        os: Os::Windows,
        arch: None,
        label: "Windows",
        archive: ArchiveKind::Zip,
    },
];

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Zip => "zip",
        }
    }
}

impl AssetRule {
    fn matches(&self, key: &PlatformKey) -> bool {
        self.os == key.os() && (self.arch.is_none() || self.arch == key.arch())
    }
}

/// Where releases are published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    /// Scheme and host, e.g. `https://github.com`
    pub base_url: String,
    /// `owner/name` repository slug
    pub repo: String,
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self {
            base_url: "https://github.com".to_string(),
            repo: "neonix888/devops-validator".to_string(),
        }
    }
}

impl ReleaseSource {
    /// `{base}/{repo}/releases/download/v{version}/{file}`
    pub fn download_url(&self, version: &semver::Version, file_name: &str) -> String {
        format!(
            "{}/{}/releases/download/v{}/{}",
            self.base_url.trim_end_matches('/'),
            self.repo.trim_matches('/'),
            version,
            file_name
        )
    }
}

/// Fully resolved release artifact for one platform and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub platform: PlatformKey,
    pub version: semver::Version,
    pub file_name: String,
    pub url: String,
    pub checksum_url: String,
    pub archive: ArchiveKind,
    /// Name of the executable inside the archive and at the install target
    pub executable_name: String,
}

/// Parse a release version, accepting an optional leading `v`
pub fn parse_version(raw: &str) -> Result<semver::Version, InstallerError> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    semver::Version::parse(bare).map_err(|e| InstallerError::InvalidVersion {
        version: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Find the table row for a platform
pub fn lookup(key: &PlatformKey) -> Result<&'static AssetRule, InstallerError> {
    ASSET_TABLE
        .iter()
        .find(|rule| rule.matches(key))
        .ok_or_else(|| InstallerError::UnsupportedPlatform {
            os: key.os().as_str().to_string(),
            arch: key.arch().map_or("unknown", |a| a.as_str()).to_string(),
        })
}

/// Canonical filename of the asset for a platform and version
pub fn asset_file_name(
    key: &PlatformKey,
    version: &semver::Version,
) -> Result<String, InstallerError> {
    let rule = lookup(key)?;
    Ok(format!(
        "{BINARY_NAME}-{version}-{}.{}",
        rule.label,
        rule.archive.extension()
    ))
}

/// Resolve the release asset for a platform and version string
pub fn resolve_asset(
    key: &PlatformKey,
    version: &str,
    source: &ReleaseSource,
) -> Result<AssetDescriptor, InstallerError> {
    let version = parse_version(version)?;
    let rule = lookup(key)?;
    let file_name = asset_file_name(key, &version)?;
    let url = source.download_url(&version, &file_name);
    let checksum_url = format!("{url}{CHECKSUM_SUFFIX}");

    Ok(AssetDescriptor {
        platform: *key,
        version,
        file_name,
        url,
        checksum_url,
        archive: rule.archive,
        executable_name: format!("{BINARY_NAME}{}", key.os().exe_suffix()),
    })
}
