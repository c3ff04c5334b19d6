//! Executable extraction from release archives
//!
//! Handles `.tar.gz` (Linux, macOS) and `.zip` (Windows) assets. Only the single
//! expected executable is written out; nothing else in the archive touches disk.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use super::asset::{ArchiveKind, AssetDescriptor};
use crate::install::error::InstallerError;

/// Whether an archive entry path names the expected executable
fn entry_matches(entry_path: &str, executable_name: &str) -> bool {
    entry_path
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .is_some_and(|base| base == executable_name)
}

fn write_entry<R: io::Read>(
    reader: &mut R,
    dest: &Path,
) -> Result<u64, InstallerError> {
    let mut out = File::create(dest).map_err(|e| InstallerError::from_io(dest, e))?;
    io::copy(reader, &mut out).map_err(|e| InstallerError::from_io(dest, e))
}

/// Extract the executable from a gzip-compressed tarball
pub fn extract_from_tar_gz(
    archive_path: &Path,
    asset_name: &str,
    executable_name: &str,
    output_dir: &Path,
) -> Result<PathBuf, InstallerError> {
    let corrupt = |e: io::Error| InstallerError::archive(asset_name, format!("corrupt tarball: {e}"));

    let file = File::open(archive_path).map_err(|e| InstallerError::from_io(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let final_path = output_dir.join(executable_name);
    let mut found: Option<String> = None;

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path().map_err(corrupt)?.to_string_lossy().into_owned();
        if !entry_matches(&entry_path, executable_name) {
            continue;
        }
        if let Some(first) = &found {
            return Err(InstallerError::archive(
                asset_name,
                format!("multiple candidates for {executable_name}: {first}, {entry_path}"),
            ));
        }
        let bytes = write_entry(&mut entry, &final_path)?;
        log::debug!("Extracted {entry_path} ({bytes} bytes) from {asset_name}");
        found = Some(entry_path);
    }

    match found {
        Some(_) => Ok(final_path),
        None => Err(InstallerError::archive(
            asset_name,
            format!("{executable_name} not found in archive"),
        )),
    }
}

/// Extract the executable from a ZIP archive
pub fn extract_from_zip(
    archive_path: &Path,
    asset_name: &str,
    executable_name: &str,
    output_dir: &Path,
) -> Result<PathBuf, InstallerError> {
    use zip::ZipArchive;

    let file = File::open(archive_path).map_err(|e| InstallerError::from_io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| InstallerError::archive(asset_name, format!("corrupt zip: {e}")))?;

    let candidates: Vec<usize> = (0..archive.len())
        .filter(|&i| {
            archive
                .by_index(i)
                .map(|f| !f.is_dir() && entry_matches(f.name(), executable_name))
                .unwrap_or(false)
        })
        .collect();

    let index = match candidates.as_slice() {
        [index] => *index,
        [] => {
            let names = (0..archive.len())
                .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(InstallerError::archive(
                asset_name,
                format!("{executable_name} not found in archive. Archive contains: {names}"),
            ));
        }
        many => {
            return Err(InstallerError::archive(
                asset_name,
                format!("{} candidates for {executable_name} in archive", many.len()),
            ));
        }
    };

    let mut entry = archive
        .by_index(index)
        .map_err(|e| InstallerError::archive(asset_name, format!("unreadable zip entry: {e}")))?;
    let final_path = output_dir.join(executable_name);
    let bytes = write_entry(&mut entry, &final_path)?;
    log::debug!("Extracted {} ({bytes} bytes) from {asset_name}", entry.name());

    Ok(final_path)
}

/// Extract the asset's executable into `output_dir` (blocking work off the runtime)
pub async fn extract_executable(
    archive_path: &Path,
    asset: &AssetDescriptor,
    output_dir: &Path,
) -> Result<PathBuf, InstallerError> {
    let archive_path = archive_path.to_path_buf();
    let output_dir = output_dir.to_path_buf();
    let asset_name = asset.file_name.clone();
    let executable_name = asset.executable_name.clone();
    let kind = asset.archive;

    tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::TarGz => {
            extract_from_tar_gz(&archive_path, &asset_name, &executable_name, &output_dir)
        }
        ArchiveKind::Zip => extract_from_zip(&archive_path, &asset_name, &executable_name, &output_dir),
    })
    .await
    .map_err(|e| InstallerError::archive(&asset.file_name, format!("extraction task failed: {e}")))?
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn tarball_nested_entry_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixtures::tar_gz(&[
            ("devops-validator-1.0.0/README.md", b"docs"),
            ("devops-validator-1.0.0/bin/devops-validator", b"ELF-binary"),
        ]);
        let path = write_archive(dir.path(), "a.tar.gz", &archive);
        let out = extract_from_tar_gz(&path, "a.tar.gz", "devops-validator", dir.path()).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"ELF-binary");
    }

    #[test]
    fn tarball_without_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixtures::tar_gz(&[("README.md", b"docs"), ("devops-validator-helper", b"x")]);
        let path = write_archive(dir.path(), "a.tar.gz", &archive);
        let err = extract_from_tar_gz(&path, "a.tar.gz", "devops-validator", dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ArchiveError");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn tarball_with_duplicate_executables_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixtures::tar_gz(&[
            ("a/devops-validator", b"one"),
            ("b/devops-validator", b"two"),
        ]);
        let path = write_archive(dir.path(), "a.tar.gz", &archive);
        let err = extract_from_tar_gz(&path, "a.tar.gz", "devops-validator", dir.path()).unwrap_err();
        assert!(err.to_string().contains("multiple candidates"));
    }

    #[test]
    fn garbage_tarball_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), "a.tar.gz", b"definitely not gzip");
        let err = extract_from_tar_gz(&path, "a.tar.gz", "devops-validator", dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ArchiveError");
    }

    #[test]
    fn zip_exe_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixtures::zip(&[
            ("LICENSE", b"MIT"),
            ("bin/devops-validator.exe", b"MZ-binary"),
        ]);
        let path = write_archive(dir.path(), "a.zip", &archive);
        let out = extract_from_zip(&path, "a.zip", "devops-validator.exe", dir.path()).unwrap();
        assert_eq!(out.file_name().unwrap(), "devops-validator.exe");
        assert_eq!(std::fs::read(out).unwrap(), b"MZ-binary");
    }

    #[test]
    fn zip_missing_entry_lists_contents() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fixtures::zip(&[("LICENSE", b"MIT")]);
        let path = write_archive(dir.path(), "a.zip", &archive);
        let err = extract_from_zip(&path, "a.zip", "devops-validator.exe", dir.path()).unwrap_err();
        assert!(err.to_string().contains("LICENSE"));
    }

    #[test]
    fn garbage_zip_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), "a.zip", b"PK? nope");
        let err = extract_from_zip(&path, "a.zip", "devops-validator.exe", dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ArchiveError");
    }

    #[test]
    fn entry_matching_uses_basename() {
        assert!(entry_matches("devops-validator", "devops-validator"));
        assert!(entry_matches("x/y/devops-validator", "devops-validator"));
        assert!(entry_matches("x\\devops-validator.exe", "devops-validator.exe"));
        assert!(!entry_matches("devops-validator.sig", "devops-validator"));
        assert!(!entry_matches("my-devops-validator", "devops-validator"));
    }
}
