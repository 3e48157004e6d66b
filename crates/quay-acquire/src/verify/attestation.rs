//! Build-provenance attestation verification.
//!
//! An attestation is a signed statement about an artifact's provenance.
//! Verification runs five gates in order, failing closed at the first
//! problem: parse the document, build the certificate chain, verify the
//! chain, digest the payload, verify the signature over the digest.
//!
//! Verification proves the statement was signed by a trusted code-signing
//! authority. It does not yet cross-check the statement's claims against
//! the artifact on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use der::{DecodePem, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pss, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_cert::Certificate;

use super::chain::{verify_chain, ChainBuilder, TrustRoots};

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("failed to read attestation {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed attestation document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("attestation carries no signatures")]
    NoSignatures,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("certificate encoding error: {0}")]
    Der(#[from] der::Error),

    #[error("malformed certificate material: {0}")]
    Malformed(String),

    #[error("failed to load trust store: {0}")]
    TrustStore(String),

    #[error("issuer fetch request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("issuer fetch from {url} returned HTTP {status}")]
    IssuerFetch { url: String, status: u16 },

    #[error("issuer chain exceeds maximum depth {0}")]
    ChainTooDeep(usize),

    #[error("no trusted path to a root for {subject}")]
    UntrustedChain { subject: String },

    #[error("certificate outside its validity window: {subject}")]
    ValidityWindow { subject: String },

    #[error("certificate not authorized for code signing: {subject}")]
    NotCodeSigning { subject: String },

    #[error("certificate key is not RSA: {subject}")]
    KeyType { subject: String },

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature verification failed: {0}")]
    BadSignature(String),
}

/// On-disk attestation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    /// Base64-encoded signed statement. Opaque here beyond hashing it.
    pub payload: String,
    pub signatures: Vec<AttestationSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationSignature {
    /// Base64-encoded RSA-PSS signature over the SHA-256 digest of the
    /// decoded payload.
    pub sig: String,
    /// PEM-encoded leaf certificate of the signer.
    pub cert: String,
}

/// Verifies attestation documents against a set of trust roots.
pub struct AttestationVerifier {
    roots: TrustRoots,
    chain: ChainBuilder,
}

impl AttestationVerifier {
    pub fn new(roots: TrustRoots) -> Result<Self, AttestationError> {
        Ok(Self {
            roots,
            chain: ChainBuilder::new()?,
        })
    }

    /// Verifier backed by the platform root store.
    pub fn with_native_roots() -> Result<Self, AttestationError> {
        Self::new(TrustRoots::native()?)
    }

    /// Read and verify the attestation document at `path`.
    pub async fn verify_file(&self, path: &Path) -> Result<(), AttestationError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| AttestationError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let attestation: Attestation = serde_json::from_slice(&raw)?;
        self.verify(&attestation).await
    }

    pub async fn verify(&self, attestation: &Attestation) -> Result<(), AttestationError> {
        // Gate 1: parse. JSON decoding already happened; an empty signature
        // list still fails closed.
        let signature = attestation
            .signatures
            .first()
            .ok_or(AttestationError::NoSignatures)?;
        let leaf = Certificate::from_pem(signature.cert.as_bytes())?;

        // Gate 2: chain-build.
        let intermediates = self.chain.collect_intermediates(&leaf).await?;

        // Gate 3: chain-verify.
        verify_chain(&leaf, &intermediates, &self.roots, SystemTime::now())?;

        // Gate 4: digest.
        let payload = BASE64.decode(&attestation.payload)?;
        let digest = Sha256::digest(&payload);

        // Gate 5: signature-verify.
        let sig = BASE64.decode(&signature.sig)?;
        let spki_der = leaf.tbs_certificate.subject_public_key_info.to_der()?;
        let key = RsaPublicKey::from_public_key_der(&spki_der).map_err(|_| {
            AttestationError::KeyType {
                subject: leaf.tbs_certificate.subject.to_string(),
            }
        })?;
        key.verify(Pss::new::<Sha256>(), &digest, &sig)
            .map_err(|err| AttestationError::BadSignature(err.to_string()))?;

        log::debug!(
            "attestation verified, signed by {}",
            leaf.tbs_certificate.subject
        );
        Ok(())
    }
}
