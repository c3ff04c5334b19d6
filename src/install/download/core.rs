//! Asset download, integrity verification and extraction

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use super::asset::AssetDescriptor;
use super::checksum;
use super::extract::extract_executable;
use super::retry::{RetryConfig, calculate_backoff_delay};
use crate::install::error::InstallerError;
use crate::install::progress::{InstallPhase, InstallProgress, PhaseTracker, ProgressSink};

/// Published checksum documents are tiny; anything larger is not one
const MAX_CHECKSUM_BYTES: usize = 64 * 1024;

/// Emit byte progress every 256KB
const PROGRESS_CHUNK: u64 = 256 * 1024;

/// Network settings for the downloader
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub connect_timeout: Duration,
    /// Abort an attempt when no body bytes arrive for this long
    pub inactivity_timeout: Duration,
    pub retry: RetryConfig,
    /// Permit plain `http://` release hosts (local mirrors and tests only)
    pub allow_insecure_http: bool,
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(300),
            retry: RetryConfig::default(),
            allow_insecure_http: false,
            user_agent: concat!("devops-validator-install/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An archive whose digest matched the published checksum, plus its executable
#[derive(Debug)]
pub struct VerifiedAsset {
    pub executable_path: PathBuf,
    pub archive_sha256: String,
    pub attempts: u32,
}

/// Archive bytes of one download attempt; the file is removed on drop
struct DownloadedArchive {
    path: TempPath,
    sha256: String,
    bytes: u64,
}

pub struct Downloader {
    client: reqwest::Client,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(settings: DownloadSettings) -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| InstallerError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Refuse anything but HTTPS unless insecure mirrors are allowed
    fn check_transport(&self, raw: &str) -> Result<(), InstallerError> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| InstallerError::Config(format!("invalid release URL {raw}: {e}")))?;
        match parsed.scheme() {
            "https" => Ok(()),
            "http" if self.settings.allow_insecure_http => {
                warn!("Downloading over plain HTTP from {raw}");
                Ok(())
            }
            scheme => Err(InstallerError::Config(format!(
                "refusing to download over '{scheme}': {raw} (HTTPS required)"
            ))),
        }
    }

    /// Download the asset, verify it against its published checksum and
    /// extract the executable into `staging_dir`.
    ///
    /// Network failures retry from the start of the download with bounded
    /// backoff. A checksum mismatch is fatal and the staged archive is deleted.
    pub async fn fetch_and_verify(
        &self,
        asset: &AssetDescriptor,
        staging_dir: &Path,
        tracker: &mut PhaseTracker,
        progress: &ProgressSink,
    ) -> Result<VerifiedAsset, InstallerError> {
        self.check_transport(&asset.url)?;
        self.check_transport(&asset.checksum_url)?;

        tracker.advance(InstallPhase::Downloading);
        progress.phase(
            InstallPhase::Downloading,
            format!("Downloading {}", asset.file_name),
        );

        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempt = 1;
        let (expected, archive) = loop {
            let result = tokio::try_join!(
                self.fetch_checksum(asset),
                self.download_archive(asset, staging_dir, attempt, progress),
            );
            match result {
                Ok(ok) => break ok,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = calculate_backoff_delay(&self.settings.retry, attempt);
                    warn!(
                        "Download attempt {attempt}/{max_attempts} for {} failed: {e}; retrying in {}ms",
                        asset.file_name,
                        delay.as_millis()
                    );
                    progress.send(InstallProgress::Retry {
                        attempt,
                        max_attempts,
                        delay_ms: delay.as_millis() as u64,
                        reason: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        info!(
            "Downloaded {} ({} bytes) in {attempt} attempt(s)",
            asset.file_name, archive.bytes
        );

        tracker.advance(InstallPhase::Verifying);
        progress.phase(
            InstallPhase::Verifying,
            format!("Verifying SHA-256 of {}", asset.file_name),
        );
        if let Err(e) = checksum::verify(&asset.file_name, &expected, &archive.sha256) {
            error!("{e}; discarding staged download");
            if let Err(io) = archive.path.close() {
                warn!("Failed to remove corrupt download: {io}");
            }
            return Err(e);
        }

        tracker.advance(InstallPhase::Extracting);
        progress.phase(
            InstallPhase::Extracting,
            format!("Extracting {}", asset.executable_name),
        );
        let executable_path = extract_executable(&archive.path, asset, staging_dir).await?;

        Ok(VerifiedAsset {
            executable_path,
            archive_sha256: archive.sha256,
            attempts: attempt,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, InstallerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InstallerError::network(url, e.to_string(), !e.is_builder()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retryable = status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT;
        Err(InstallerError::network(url, format!("HTTP {status}"), retryable))
    }

    /// Fetch the published digest from the same origin as the asset
    async fn fetch_checksum(&self, asset: &AssetDescriptor) -> Result<String, InstallerError> {
        let url = &asset.checksum_url;
        let response = self.get(url).await?;
        let oversized = |len: u64| {
            InstallerError::archive(
                &asset.file_name,
                format!("published checksum is at least {len} bytes, expected a digest"),
            )
        };
        if let Some(len) = response.content_length()
            && len > MAX_CHECKSUM_BYTES as u64
        {
            return Err(oversized(len));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = match timeout(self.settings.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(InstallerError::network(url, e.to_string(), true)),
                Ok(None) => break,
                Err(_) => {
                    return Err(InstallerError::network(url, "timed out reading checksum", true));
                }
            };
            if body.len() + chunk.len() > MAX_CHECKSUM_BYTES {
                return Err(oversized((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body);
        let digest = checksum::parse_checksum_document(&text, &asset.file_name)?;
        debug!("Published SHA-256 for {}: {digest}", asset.file_name);
        Ok(digest)
    }

    /// Stream the archive into a fresh temp file, hashing as bytes arrive
    async fn download_archive(
        &self,
        asset: &AssetDescriptor,
        staging_dir: &Path,
        attempt: u32,
        progress: &ProgressSink,
    ) -> Result<DownloadedArchive, InstallerError> {
        let url = &asset.url;
        let response = self.get(url).await?;
        let total_bytes = response.content_length().unwrap_or(0);

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", asset.file_name))
            .suffix(".part")
            .tempfile_in(staging_dir)
            .map_err(|e| InstallerError::from_io(staging_dir, e))?;
        let std_file = temp
            .reopen()
            .map_err(|e| InstallerError::from_io(temp.path(), e))?;
        let path = temp.into_temp_path();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_progress_bytes = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            let chunk = match timeout(self.settings.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(InstallerError::network(url, e.to_string(), true)),
                Ok(None) => break,
                Err(_) => {
                    return Err(InstallerError::network(
                        url,
                        format!(
                            "no data received for {} seconds ({downloaded}/{total_bytes} bytes)",
                            self.settings.inactivity_timeout.as_secs()
                        ),
                        true,
                    ));
                }
            };

            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallerError::from_io(&*path, e))?;
            downloaded += chunk.len() as u64;

            if downloaded - last_progress_bytes >= PROGRESS_CHUNK || downloaded == total_bytes {
                progress.send(InstallProgress::Bytes {
                    asset: asset.file_name.clone(),
                    attempt,
                    downloaded,
                    total_bytes,
                });
                last_progress_bytes = downloaded;
            }
        }

        if total_bytes > 0 && downloaded != total_bytes {
            return Err(InstallerError::network(
                url,
                format!("truncated body: {downloaded} of {total_bytes} bytes"),
                true,
            ));
        }

        file.flush()
            .await
            .map_err(|e| InstallerError::from_io(&*path, e))?;
        file.sync_all()
            .await
            .map_err(|e| InstallerError::from_io(&*path, e))?;

        Ok(DownloadedArchive {
            path,
            sha256: hex::encode(hasher.finalize()),
            bytes: downloaded,
        })
    }
}
