//! Artifact acquisition pipeline for a runtime/package manager.
//!
//! This crate fetches build artifacts (language runtimes, packages) from
//! object storage or plain HTTPS endpoints, verifies that each artifact is
//! byte-for-byte correct and was produced by a trusted build system, and
//! unpacks it onto local disk while reporting progress for multi-item
//! batches.
//!
//! The pipeline is caller-driven:
//!
//! 1. build a batch of [`DownloadEntry`] values,
//! 2. run the batch through the [`DownloadManager`] worker pool,
//! 3. validate each downloaded blob with [`validate_checksum`] and/or an
//!    [`AttestationVerifier`],
//! 4. hand validated archives to [`unpack`] for extraction.
//!
//! Which artifacts to fetch, and which checksums or attestations to expect,
//! is decided by an external build-plan/metadata layer. This crate performs
//! no retries, no caching, and no rollback of partially completed batches.

pub mod download;
pub mod error;
pub mod progress;
pub mod unpack;
pub mod verify;

pub use download::{
    BatchError, DownloadEntry, DownloadManager, FetchError, HttpsFetcher, StorageClient,
    StorageClientConfig, StorageLocator, VecSink, WriteAt,
};
pub use error::{AcquireError, Result};
pub use progress::{
    format_bytes, NoopProgress, NoopReporter, ProgressFactory, ProgressManager,
    ProgressReporter, RecordingReporter,
};
pub use unpack::{unpack, ExtractError, UnpackOptions, UnpackProgress, Unpacker};
pub use verify::{
    validate_checksum, Attestation, AttestationError, AttestationSignature, AttestationVerifier,
    IntegrityError, TrustRoots,
};
