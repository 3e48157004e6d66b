//! Certificate-chain construction and validation.
//!
//! Intermediate certificates are discovered by following the caIssuers
//! entries of each certificate's Authority Information Access extension.
//! Those URLs come from untrusted input, so the traversal is bounded by a
//! maximum depth and a visited-URL set.

use std::collections::HashSet;
use std::time::SystemTime;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use const_oid::db::rfc5280::{
    ID_AD_CA_ISSUERS, ID_CE_EXT_KEY_USAGE, ID_KP_CODE_SIGNING, ID_PE_AUTHORITY_INFO_ACCESS,
};
use const_oid::db::rfc5911::ID_SIGNED_DATA;
use const_oid::db::rfc5912::{
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AuthorityInfoAccessSyntax, ExtendedKeyUsage};
use x509_cert::Certificate;

use super::attestation::AttestationError;
use crate::download::{CONNECT_TIMEOUT, USER_AGENT};

// Not in the const-oid database.
const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

pub(crate) const MAX_CHAIN_DEPTH: usize = 8;

/// The set of root certificates a chain may terminate at.
pub struct TrustRoots {
    roots: Vec<Certificate>,
}

impl TrustRoots {
    /// Load the platform's root store. Entries the parser cannot handle are
    /// skipped; platform stores routinely carry legacy certificates.
    pub fn native() -> Result<Self, AttestationError> {
        let ders = rustls_native_certs::load_native_certs()
            .map_err(|err| AttestationError::TrustStore(err.to_string()))?;
        let mut roots = Vec::new();
        for der in ders {
            match Certificate::from_der(der.as_ref()) {
                Ok(cert) => roots.push(cert),
                Err(err) => log::debug!("skipping unparseable root certificate: {}", err),
            }
        }
        log::debug!("loaded {} platform root certificates", roots.len());
        Ok(Self { roots })
    }

    pub fn from_certificates(roots: Vec<Certificate>) -> Self {
        Self { roots }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn find_issuer(&self, cert: &Certificate) -> Option<&Certificate> {
        self.roots
            .iter()
            .find(|root| root.tbs_certificate.subject == cert.tbs_certificate.issuer)
    }
}

/// Fetches intermediate certificates referenced by AIA caIssuers URLs.
pub(crate) struct ChainBuilder {
    client: reqwest::Client,
}

impl ChainBuilder {
    pub(crate) fn new() -> Result<Self, AttestationError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Walk the leaf's issuer URLs breadth-first, pooling every discovered
    /// certificate and recursing into their issuer URLs too. Each URL is
    /// fetched at most once and the walk stops after [`MAX_CHAIN_DEPTH`]
    /// levels.
    pub(crate) async fn collect_intermediates(
        &self,
        leaf: &Certificate,
    ) -> Result<Vec<Certificate>, AttestationError> {
        let mut pool = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = ca_issuer_urls(leaf)?;

        let mut depth = 0;
        while !frontier.is_empty() {
            if depth >= MAX_CHAIN_DEPTH {
                return Err(AttestationError::ChainTooDeep(MAX_CHAIN_DEPTH));
            }
            depth += 1;

            let mut next = Vec::new();
            for url in frontier {
                if !visited.insert(url.clone()) {
                    continue;
                }
                for cert in self.fetch_issuer(&url).await? {
                    next.extend(ca_issuer_urls(&cert)?);
                    pool.push(cert);
                }
            }
            frontier = next;
        }
        Ok(pool)
    }

    async fn fetch_issuer(&self, url: &str) -> Result<Vec<Certificate>, AttestationError> {
        log::debug!("fetching issuer certificate from {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttestationError::IssuerFetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;

        // Bundles are distinguished by suffix convention, not content type.
        if url.ends_with(".p7c") {
            parse_pkcs7_certificates(&body)
        } else {
            Ok(vec![Certificate::from_der(&body)?])
        }
    }
}

/// Pull the certificate set out of a PKCS#7 SignedData bundle.
fn parse_pkcs7_certificates(der_bytes: &[u8]) -> Result<Vec<Certificate>, AttestationError> {
    let info = ContentInfo::from_der(der_bytes)?;
    if info.content_type != ID_SIGNED_DATA {
        return Err(AttestationError::Malformed(format!(
            "PKCS#7 bundle is not SignedData ({})",
            info.content_type
        )));
    }
    let signed: SignedData = info.content.decode_as()?;

    let mut certs = Vec::new();
    if let Some(set) = signed.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                certs.push(cert.clone());
            }
        }
    }
    Ok(certs)
}

fn ca_issuer_urls(cert: &Certificate) -> Result<Vec<String>, AttestationError> {
    let mut urls = Vec::new();
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(urls);
    };
    for ext in extensions {
        if ext.extn_id != ID_PE_AUTHORITY_INFO_ACCESS {
            continue;
        }
        let aia = AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes())?;
        for desc in &aia.0 {
            if desc.access_method != ID_AD_CA_ISSUERS {
                continue;
            }
            if let GeneralName::UniformResourceIdentifier(uri) = &desc.access_location {
                urls.push(uri.as_str().to_string());
            }
        }
    }
    Ok(urls)
}

/// Validate `leaf` against the intermediate pool and the trust roots.
///
/// Every certificate on the path must be inside its validity window, be
/// authorized for code signing (an absent EKU extension is unconstrained
/// and passes; a present one must name code-signing or anyExtendedKeyUsage),
/// and carry a signature that verifies under its issuer's key. The path
/// must terminate at one of `roots`.
pub(crate) fn verify_chain(
    leaf: &Certificate,
    intermediates: &[Certificate],
    roots: &TrustRoots,
    now: SystemTime,
) -> Result<(), AttestationError> {
    let mut current = leaf;
    let mut seen_subjects: HashSet<Vec<u8>> = HashSet::new();

    for _ in 0..=MAX_CHAIN_DEPTH {
        check_validity(current, now)?;
        require_code_signing(current)?;

        if let Some(root) = roots.find_issuer(current) {
            check_validity(root, now)?;
            require_code_signing(root)?;
            verify_signed_by(current, root)?;
            return Ok(());
        }

        let issuer = intermediates
            .iter()
            .find(|cand| cand.tbs_certificate.subject == current.tbs_certificate.issuer)
            .ok_or_else(|| AttestationError::UntrustedChain {
                subject: current.tbs_certificate.subject.to_string(),
            })?;
        verify_signed_by(current, issuer)?;

        if !seen_subjects.insert(issuer.tbs_certificate.subject.to_der()?) {
            return Err(AttestationError::UntrustedChain {
                subject: issuer.tbs_certificate.subject.to_string(),
            });
        }
        current = issuer;
    }
    Err(AttestationError::ChainTooDeep(MAX_CHAIN_DEPTH))
}

fn check_validity(cert: &Certificate, now: SystemTime) -> Result<(), AttestationError> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_system_time();
    let not_after = validity.not_after.to_system_time();
    if now < not_before || now > not_after {
        return Err(AttestationError::ValidityWindow {
            subject: cert.tbs_certificate.subject.to_string(),
        });
    }
    Ok(())
}

fn require_code_signing(cert: &Certificate) -> Result<(), AttestationError> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(());
    };
    for ext in extensions {
        if ext.extn_id != ID_CE_EXT_KEY_USAGE {
            continue;
        }
        let eku = ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())?;
        let allowed = eku
            .0
            .iter()
            .any(|oid| *oid == ID_KP_CODE_SIGNING || *oid == ANY_EXTENDED_KEY_USAGE);
        if !allowed {
            return Err(AttestationError::NotCodeSigning {
                subject: cert.tbs_certificate.subject.to_string(),
            });
        }
    }
    Ok(())
}

/// Verify `cert`'s signature under `issuer`'s public key. Only RSA PKCS#1
/// v1.5 with a SHA-2 digest is accepted.
fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> Result<(), AttestationError> {
    let spki_der = issuer.tbs_certificate.subject_public_key_info.to_der()?;
    let key = RsaPublicKey::from_public_key_der(&spki_der).map_err(|_| {
        AttestationError::KeyType {
            subject: issuer.tbs_certificate.subject.to_string(),
        }
    })?;

    let tbs = cert.tbs_certificate.to_der()?;
    let sig_bytes = cert
        .signature
        .as_bytes()
        .ok_or_else(|| AttestationError::Malformed("certificate signature has unused bits".into()))?;
    let signature = Signature::try_from(sig_bytes)
        .map_err(|err| AttestationError::BadSignature(err.to_string()))?;

    let oid = cert.signature_algorithm.oid;
    let verified = if oid == SHA_256_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha256>::new(key).verify(&tbs, &signature)
    } else if oid == SHA_384_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha384>::new(key).verify(&tbs, &signature)
    } else if oid == SHA_512_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha512>::new(key).verify(&tbs, &signature)
    } else {
        return Err(AttestationError::UnsupportedAlgorithm(oid.to_string()));
    };

    verified.map_err(|err| AttestationError::BadSignature(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::test_certs;
    use cms::signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos};
    use const_oid::db::rfc5911::ID_DATA;
    use der::asn1::SetOfVec;
    use der::Any;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_direct_chain_to_root_verifies() {
        let fixtures = test_certs::root_and_leaf();
        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);

        verify_chain(&fixtures.leaf, &[], &roots, SystemTime::now()).unwrap();
    }

    #[test]
    fn test_expired_leaf_is_rejected() {
        let fixtures = test_certs::root_and_expired_leaf();
        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);

        let err = verify_chain(&fixtures.leaf, &[], &roots, SystemTime::now()).unwrap_err();
        assert!(matches!(err, AttestationError::ValidityWindow { .. }));
    }

    #[test]
    fn test_leaf_without_code_signing_eku_is_rejected() {
        let fixtures = test_certs::root_and_non_code_signing_leaf();
        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);

        let err = verify_chain(&fixtures.leaf, &[], &roots, SystemTime::now()).unwrap_err();
        assert!(matches!(err, AttestationError::NotCodeSigning { .. }));
    }

    #[test]
    fn test_root_without_code_signing_eku_is_rejected() {
        let fixtures = test_certs::constrained_root_and_leaf();
        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);

        let err = verify_chain(&fixtures.leaf, &[], &roots, SystemTime::now()).unwrap_err();
        assert!(matches!(err, AttestationError::NotCodeSigning { .. }));
    }

    #[test]
    fn test_missing_issuer_is_untrusted() {
        let fixtures = test_certs::root_and_leaf();
        let roots = TrustRoots::from_certificates(vec![]);

        let err = verify_chain(&fixtures.leaf, &[], &roots, SystemTime::now()).unwrap_err();
        assert!(matches!(err, AttestationError::UntrustedChain { .. }));
    }

    #[test]
    fn test_chain_through_intermediate_pool() {
        let fixtures = test_certs::root_intermediate_leaf(None);
        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);

        verify_chain(
            &fixtures.leaf,
            &[fixtures.intermediate.clone()],
            &roots,
            SystemTime::now(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_aia_fetch_of_der_intermediate() {
        let server = MockServer::start().await;
        let url = format!("{}/intermediate.der", server.uri());
        let fixtures = test_certs::root_intermediate_leaf(Some(&url));

        Mock::given(method("GET"))
            .and(path("/intermediate.der"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(fixtures.intermediate.to_der().unwrap()),
            )
            .mount(&server)
            .await;

        let builder = ChainBuilder::new().unwrap();
        let pool = builder.collect_intermediates(&fixtures.leaf).await.unwrap();
        assert_eq!(pool.len(), 1);

        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);
        verify_chain(&fixtures.leaf, &pool, &roots, SystemTime::now()).unwrap();
    }

    #[tokio::test]
    async fn test_aia_fetch_of_p7c_bundle() {
        let server = MockServer::start().await;
        let url = format!("{}/chain.p7c", server.uri());
        let fixtures = test_certs::root_intermediate_leaf(Some(&url));

        let mut set = SetOfVec::new();
        set.insert(CertificateChoices::Certificate(
            fixtures.intermediate.clone(),
        ))
        .unwrap();
        let signed = SignedData {
            version: cms::content_info::CmsVersion::V1,
            digest_algorithms: SetOfVec::new(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(set)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::new()),
        };
        let bundle = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed).unwrap(),
        };

        Mock::given(method("GET"))
            .and(path("/chain.p7c"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle.to_der().unwrap()))
            .mount(&server)
            .await;

        let builder = ChainBuilder::new().unwrap();
        let pool = builder.collect_intermediates(&fixtures.leaf).await.unwrap();
        assert_eq!(pool.len(), 1);

        let roots = TrustRoots::from_certificates(vec![fixtures.root.clone()]);
        verify_chain(&fixtures.leaf, &pool, &roots, SystemTime::now()).unwrap();
    }

    #[tokio::test]
    async fn test_issuer_urls_visited_once() {
        let server = MockServer::start().await;
        let url = format!("{}/self.der", server.uri());
        // The served certificate points its AIA back at the same URL; the
        // visited set must stop the loop after one fetch.
        let fixtures = test_certs::root_intermediate_leaf(Some(&url));
        let looped = test_certs::reissue_with_aia(&fixtures.intermediate, &url);

        Mock::given(method("GET"))
            .and(path("/self.der"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(looped.to_der().unwrap()))
            .expect(1)
            .mount(&server)
            .await;

        let builder = ChainBuilder::new().unwrap();
        let pool = builder.collect_intermediates(&fixtures.leaf).await.unwrap();
        assert_eq!(pool.len(), 1);
    }
}
