use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::install::download::{DownloadSettings, ReleaseSource, RetryConfig};
use crate::install::error::InstallerError;

/// Release published by default when no version is requested
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Installer configuration (every field optional in the TOML file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Release host, scheme included
    pub base_url: String,
    /// `owner/name` slug on the release host
    pub repo: String,
    pub version: String,
    pub install_dir: Option<PathBuf>,
    /// Allow `http://` release hosts (local mirrors only)
    pub allow_insecure_http: bool,
    pub connect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let source = ReleaseSource::default();
        Self {
            base_url: source.base_url,
            repo: source.repo,
            version: DEFAULT_VERSION.to_string(),
            install_dir: None,
            allow_insecure_http: false,
            connect_timeout_secs: 30,
            inactivity_timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

/// `<config dir>/devops-validator/installer.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("devops-validator").join("installer.toml"))
}

/// `<local data dir>/devops-validator/bin`, where the wrappers look first
pub fn default_install_dir() -> Result<PathBuf, InstallerError> {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .map(|d| d.join("devops-validator").join("bin"))
        .ok_or_else(|| {
            InstallerError::Config(
                "could not determine a data directory; pass --install-dir".to_string(),
            )
        })
}

impl InstallerConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. The default path is optional and falls back
    /// to built-in defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, InstallerError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                return Err(InstallerError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            log::debug!("No installer config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            InstallerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let cfg = Self::from_toml(&raw).map_err(|e| match e {
            InstallerError::Config(msg) => {
                InstallerError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        log::info!("Using installer config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self, InstallerError> {
        let cfg: Self = toml::from_str(raw)
            .map_err(|e| InstallerError::Config(format!("failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), InstallerError> {
        if self.retry.max_attempts == 0 {
            return Err(InstallerError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(InstallerError::Config(format!(
                "repo must be 'owner/name', got '{}'",
                self.repo
            )));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| InstallerError::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        Ok(())
    }

    pub fn release_source(&self) -> ReleaseSource {
        ReleaseSource {
            base_url: self.base_url.clone(),
            repo: self.repo.clone(),
        }
    }

    pub fn download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            retry: self.retry.clone(),
            allow_insecure_http: self.allow_insecure_http,
            ..DownloadSettings::default()
        }
    }

    /// Install directory from config, else the platform default
    pub fn resolve_install_dir(&self) -> Result<PathBuf, InstallerError> {
        match &self.install_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_install_dir(),
        }
    }
}
