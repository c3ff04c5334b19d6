//! Release asset resolution, download and extraction
//!
//! ## Module Organization
//!
//! - `platform` - Host platform detection (`PlatformKey`)
//! - `asset` - Pure platform → asset-name table and release URLs
//! - `checksum` - Published SHA-256 parsing and hashing
//! - `retry` - Bounded exponential backoff
//! - `extract` - `.tar.gz` / `.zip` executable extraction
//! - `core` - Download orchestration with verification

pub mod asset;
pub mod checksum;
mod core;
pub mod extract;
pub mod platform;
pub mod retry;

pub use asset::{AssetDescriptor, ReleaseSource, resolve_asset};
pub use core::{DownloadSettings, Downloader, VerifiedAsset};
pub use platform::{Arch, Os, PlatformKey};
pub use retry::RetryConfig;
