//! SHA-256 checksum validation of downloaded artifacts.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Compare the SHA-256 digest of `path` against `expected` (hex, compared
/// case-insensitively). `None` skips the check entirely; artifact metadata
/// does not always carry a checksum.
///
/// This guards against transport corruption only. If the expected hash came
/// from an untrusted source, a matching digest proves nothing about
/// provenance; that is what attestations are for.
pub async fn validate_checksum(
    path: &Path,
    expected: Option<&str>,
) -> Result<(), IntegrityError> {
    let Some(expected) = expected else {
        log::debug!("no checksum for {}, skipping validation", path.display());
        return Ok(());
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| IntegrityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let actual = format!("{:x}", Sha256::digest(&bytes));

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(IntegrityError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
