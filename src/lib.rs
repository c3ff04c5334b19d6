//! Release installer for the devops-validator CLI.
//!
//! Resolves the published release asset for a platform, downloads it over
//! HTTPS, verifies it against its published SHA-256 checksum and atomically
//! installs the executable.

pub mod cli;
pub mod config;
pub mod install;
