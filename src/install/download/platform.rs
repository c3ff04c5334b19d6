//! Platform detection for release asset selection

use std::fmt;

use once_cell::sync::OnceCell;

use crate::install::error::InstallerError;

/// Operating-system family of a release asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

/// CPU architecture of a release asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// The (OS, architecture) pair identifying which asset a host needs.
///
/// Linux keys always carry an architecture. macOS and Windows releases ship a
/// single artifact, so their architecture is recorded when recognised but never
/// consulted when picking the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    os: Os,
    arch: Option<Arch>,
}

/// Global cache for host detection (initialized once per process)
static HOST_PLATFORM: OnceCell<PlatformKey> = OnceCell::new();

impl Os {
    /// Parse an OS name as reported by Rust, Node (`process.platform`) or Python
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linux" => Some(Os::Linux),
            "macos" | "darwin" | "osx" => Some(Os::MacOs),
            "windows" | "win32" => Some(Os::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
        }
    }

    /// Suffix of executables on this OS (the wrappers append `.exe` on win32)
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Os::Windows => ".exe",
            Os::Linux | Os::MacOs => "",
        }
    }

    /// Whether the release naming scheme ships one asset per architecture
    pub fn distinguishes_arch(&self) -> bool {
        matches!(self, Os::Linux)
    }
}

impl Arch {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "x86_64" | "x64" | "amd64" => Some(Arch::X86_64),
            "aarch64" | "arm64" => Some(Arch::Aarch64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl PlatformKey {
    /// Build a key from raw OS and architecture names.
    ///
    /// Fails with `UnsupportedPlatform` for an unknown OS, or an unknown
    /// architecture on an OS whose releases are split by architecture.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, InstallerError> {
        let unsupported = || InstallerError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let parsed_os = Os::parse(os).ok_or_else(unsupported)?;
        let parsed_arch = Arch::parse(arch);

        if parsed_os.distinguishes_arch() && parsed_arch.is_none() {
            return Err(unsupported());
        }

        Ok(Self {
            os: parsed_os,
            arch: parsed_arch,
        })
    }

    /// Detect the host platform (cached after first call)
    pub fn detect() -> Result<Self, InstallerError> {
        HOST_PLATFORM
            .get_or_try_init(|| {
                let key = Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)?;
                log::debug!("Detected host platform {key}");
                Ok(key)
            })
            .copied()
    }

    /// Resolve the platform to install for, honouring explicit overrides.
    ///
    /// A missing override falls back to the host value for that half of the key.
    pub fn resolve(os: Option<&str>, arch: Option<&str>) -> Result<Self, InstallerError> {
        match (os, arch) {
            (None, None) => Self::detect(),
            (os, arch) => Self::from_parts(
                os.unwrap_or(std::env::consts::OS),
                arch.unwrap_or(std::env::consts::ARCH),
            ),
        }
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn arch(&self) -> Option<Arch> {
        self.arch
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arch {
            Some(arch) => write!(f, "{}/{}", self.os.as_str(), arch.as_str()),
            None => write!(f, "{}", self.os.as_str()),
        }
    }
}
