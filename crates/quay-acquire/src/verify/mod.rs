//! Artifact verification: checksums and signed attestations.

mod attestation;
mod chain;
mod checksum;

#[cfg(test)]
pub(crate) mod test_certs;

pub use attestation::{Attestation, AttestationError, AttestationSignature, AttestationVerifier};
pub use chain::TrustRoots;
pub use checksum::{validate_checksum, IntegrityError};
