use thiserror::Error;

use crate::download::{BatchError, FetchError};
use crate::unpack::ExtractError;
use crate::verify::{AttestationError, IntegrityError};

/// Crate-level error wrapping the per-subsystem error kinds.
///
/// Every variant is terminal for the operation it belongs to; nothing in
/// this crate retries internally. Retrying, if desired, is the caller's
/// responsibility.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("batch download failed: {0}")]
    Batch(#[from] BatchError),

    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("attestation verification failed: {0}")]
    Attestation(#[from] AttestationError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AcquireError>;
