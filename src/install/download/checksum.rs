//! SHA-256 digests for downloaded assets
//!
//! A release publishes `<asset>.sha256` next to each asset. The document is
//! either a bare hex digest or `sha256sum` output (`<hex>  <file>` per line,
//! optionally with a `*` binary marker before the name).

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::install::error::InstallerError;

const DIGEST_HEX_LEN: usize = 64;

/// Extract the digest for `file_name` from a checksum document
pub fn parse_checksum_document(
    document: &str,
    file_name: &str,
) -> Result<String, InstallerError> {
    let invalid = |message: String| InstallerError::archive(file_name, message);

    let lines: Vec<&str> = document
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    if lines.is_empty() {
        return Err(invalid("published checksum is empty".to_string()));
    }

    for line in &lines {
        let mut parts = line.split_whitespace();
        let Some(digest) = parts.next() else {
            continue;
        };
        match parts.next() {
            // Bare digest only valid as a single-line document
            None if lines.len() == 1 => return normalise_digest(digest, file_name),
            None => continue,
            Some(name) => {
                let name = name.trim_start_matches('*');
                let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
                if base == file_name {
                    return normalise_digest(digest, file_name);
                }
            }
        }
    }

    Err(invalid(format!(
        "published checksum document has no entry for {file_name}"
    )))
}

fn normalise_digest(digest: &str, file_name: &str) -> Result<String, InstallerError> {
    let lower = digest.to_ascii_lowercase();
    if lower.len() != DIGEST_HEX_LEN || hex::decode(&lower).is_err() {
        return Err(InstallerError::archive(
            file_name,
            format!("published checksum '{digest}' is not a SHA-256 hex digest"),
        ));
    }
    Ok(lower)
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex SHA-256 of a file, read in chunks
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a computed digest against the published one
pub fn verify(asset: &str, expected: &str, actual: &str) -> Result<(), InstallerError> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(InstallerError::ChecksumMismatch {
            asset: asset.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "devops-validator-1.0.0-Linux-x86_64.tar.gz";

    fn digest_of(s: &str) -> String {
        sha256_hex(s.as_bytes())
    }

    #[test]
    fn bare_digest() {
        let d = digest_of("abc");
        assert_eq!(parse_checksum_document(&format!("{d}\n"), ASSET).unwrap(), d);
    }

    #[test]
    fn uppercase_digest_is_normalised() {
        let d = digest_of("abc");
        let parsed = parse_checksum_document(&d.to_uppercase(), ASSET).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn sha256sum_format_picks_matching_line() {
        let mine = digest_of("mine");
        let other = digest_of("other");
        let doc = format!(
            "# release sums\n{other}  devops-validator-1.0.0-macOS.tar.gz\n{mine} *dist/{ASSET}\n"
        );
        assert_eq!(parse_checksum_document(&doc, ASSET).unwrap(), mine);
    }

    #[test]
    fn missing_entry_is_an_error() {
        let doc = format!("{}  something-else.zip\n", digest_of("x"));
        assert!(parse_checksum_document(&doc, ASSET).is_err());
        assert!(parse_checksum_document("   \n", ASSET).is_err());
    }

    #[test]
    fn non_hex_digest_is_rejected() {
        let bogus = "z".repeat(64);
        assert!(parse_checksum_document(&bogus, ASSET).is_err());
        assert!(parse_checksum_document("abcd", ASSET).is_err());
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_hash_matches_slice_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let data = vec![7u8; 200_000];
        std::fs::write(&path, &data).unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(&data));
    }

    #[test]
    fn verify_reports_mismatch() {
        let err = verify(ASSET, "aa", "bb").unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatch");
        assert!(verify(ASSET, "AA", "aa").is_ok());
    }
}
