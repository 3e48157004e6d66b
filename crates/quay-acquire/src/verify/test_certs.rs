//! Hand-built certificate fixtures for verification tests.
//!
//! Keys are generated once per test process; 2048-bit generation is slow
//! enough that every fixture shares the same three keys.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use const_oid::db::rfc5280::{
    ID_AD_CA_ISSUERS, ID_CE_EXT_KEY_USAGE, ID_KP_CODE_SIGNING, ID_KP_EMAIL_PROTECTION,
    ID_PE_AUTHORITY_INFO_ACCESS,
};
use const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION;
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, Ia5String, OctetString, UtcTime};
use der::{Decode, Encode};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax, ExtendedKeyUsage};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

// 2020-01-01 .. 2035-01-01
const VALID_FROM: u64 = 1_577_836_800;
const VALID_TO: u64 = 2_051_222_400;
// 2010-01-01 .. 2011-01-01
const EXPIRED_FROM: u64 = 1_262_304_000;
const EXPIRED_TO: u64 = 1_293_840_000;

pub(crate) struct RootLeaf {
    pub root: Certificate,
    pub leaf: Certificate,
}

pub(crate) struct RootIntermediateLeaf {
    pub root: Certificate,
    pub intermediate: Certificate,
    pub leaf: Certificate,
}

pub(crate) fn ca_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

pub(crate) fn intermediate_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

pub(crate) fn leaf_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

struct CertParams<'a> {
    subject: &'a str,
    issuer: &'a str,
    public_key: &'a RsaPublicKey,
    signing_key: &'a RsaPrivateKey,
    serial: u8,
    not_before: u64,
    not_after: u64,
    eku: Option<Vec<ObjectIdentifier>>,
    aia_url: Option<&'a str>,
}

fn make_cert(params: CertParams<'_>) -> Certificate {
    let spki_der = params.public_key.to_public_key_der().unwrap();
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).unwrap();

    let mut extensions = Vec::new();
    if let Some(oids) = params.eku {
        let eku = ExtendedKeyUsage(oids).to_der().unwrap();
        extensions.push(Extension {
            extn_id: ID_CE_EXT_KEY_USAGE,
            critical: false,
            extn_value: OctetString::new(eku).unwrap(),
        });
    }
    if let Some(url) = params.aia_url {
        let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
            access_method: ID_AD_CA_ISSUERS,
            access_location: GeneralName::UniformResourceIdentifier(
                Ia5String::new(url).unwrap(),
            ),
        }])
        .to_der()
        .unwrap();
        extensions.push(Extension {
            extn_id: ID_PE_AUTHORITY_INFO_ACCESS,
            critical: false,
            extn_value: OctetString::new(aia).unwrap(),
        });
    }

    let algorithm = AlgorithmIdentifierOwned {
        oid: SHA_256_WITH_RSA_ENCRYPTION,
        parameters: None,
    };
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[params.serial]).unwrap(),
        signature: algorithm.clone(),
        issuer: Name::from_str(params.issuer).unwrap(),
        validity: Validity {
            not_before: Time::UtcTime(
                UtcTime::from_unix_duration(Duration::from_secs(params.not_before)).unwrap(),
            ),
            not_after: Time::UtcTime(
                UtcTime::from_unix_duration(Duration::from_secs(params.not_after)).unwrap(),
            ),
        },
        subject: Name::from_str(params.subject).unwrap(),
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: if extensions.is_empty() {
            None
        } else {
            Some(extensions)
        },
    };

    let tbs_der = tbs.to_der().unwrap();
    let signer = SigningKey::<Sha256>::new(params.signing_key.clone());
    let signature = signer.sign(&tbs_der);

    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature.to_vec()).unwrap(),
    }
}

fn make_root() -> Certificate {
    make_cert(CertParams {
        subject: "CN=Acquire Test Root",
        issuer: "CN=Acquire Test Root",
        public_key: &ca_key().to_public_key(),
        signing_key: ca_key(),
        serial: 1,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: None,
        aia_url: None,
    })
}

pub(crate) fn root_and_leaf() -> RootLeaf {
    let root = make_root();
    let leaf = make_cert(CertParams {
        subject: "CN=Acquire Test Leaf",
        issuer: "CN=Acquire Test Root",
        public_key: &leaf_key().to_public_key(),
        signing_key: ca_key(),
        serial: 2,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: Some(vec![ID_KP_CODE_SIGNING]),
        aia_url: None,
    });
    RootLeaf { root, leaf }
}

/// Root whose EKU extension names email protection only. A valid leaf
/// hanging off it must still be rejected.
pub(crate) fn constrained_root_and_leaf() -> RootLeaf {
    let root = make_cert(CertParams {
        subject: "CN=Acquire Constrained Root",
        issuer: "CN=Acquire Constrained Root",
        public_key: &ca_key().to_public_key(),
        signing_key: ca_key(),
        serial: 8,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: Some(vec![ID_KP_EMAIL_PROTECTION]),
        aia_url: None,
    });
    let leaf = make_cert(CertParams {
        subject: "CN=Acquire Test Leaf",
        issuer: "CN=Acquire Constrained Root",
        public_key: &leaf_key().to_public_key(),
        signing_key: ca_key(),
        serial: 9,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: Some(vec![ID_KP_CODE_SIGNING]),
        aia_url: None,
    });
    RootLeaf { root, leaf }
}

pub(crate) fn root_and_expired_leaf() -> RootLeaf {
    let root = make_root();
    let leaf = make_cert(CertParams {
        subject: "CN=Acquire Expired Leaf",
        issuer: "CN=Acquire Test Root",
        public_key: &leaf_key().to_public_key(),
        signing_key: ca_key(),
        serial: 3,
        not_before: EXPIRED_FROM,
        not_after: EXPIRED_TO,
        eku: Some(vec![ID_KP_CODE_SIGNING]),
        aia_url: None,
    });
    RootLeaf { root, leaf }
}

pub(crate) fn root_and_non_code_signing_leaf() -> RootLeaf {
    let root = make_root();
    let leaf = make_cert(CertParams {
        subject: "CN=Acquire Email Leaf",
        issuer: "CN=Acquire Test Root",
        public_key: &leaf_key().to_public_key(),
        signing_key: ca_key(),
        serial: 4,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: Some(vec![ID_KP_EMAIL_PROTECTION]),
        aia_url: None,
    });
    RootLeaf { root, leaf }
}

pub(crate) fn root_intermediate_leaf(leaf_aia_url: Option<&str>) -> RootIntermediateLeaf {
    let root = make_root();
    let intermediate = make_cert(CertParams {
        subject: "CN=Acquire Test Intermediate",
        issuer: "CN=Acquire Test Root",
        public_key: &intermediate_key().to_public_key(),
        signing_key: ca_key(),
        serial: 5,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: None,
        aia_url: None,
    });
    let leaf = make_cert(CertParams {
        subject: "CN=Acquire Test Leaf",
        issuer: "CN=Acquire Test Intermediate",
        public_key: &leaf_key().to_public_key(),
        signing_key: intermediate_key(),
        serial: 6,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: Some(vec![ID_KP_CODE_SIGNING]),
        aia_url: leaf_aia_url,
    });
    RootIntermediateLeaf {
        root,
        intermediate,
        leaf,
    }
}

/// Rebuild `cert` with an AIA extension pointing at `url`, signed by the
/// test CA. Used to simulate issuer references that loop back on themselves.
pub(crate) fn reissue_with_aia(cert: &Certificate, url: &str) -> Certificate {
    let subject = cert.tbs_certificate.subject.to_string();
    let issuer = cert.tbs_certificate.issuer.to_string();
    make_cert(CertParams {
        subject: &subject,
        issuer: &issuer,
        public_key: &intermediate_key().to_public_key(),
        signing_key: ca_key(),
        serial: 7,
        not_before: VALID_FROM,
        not_after: VALID_TO,
        eku: None,
        aia_url: Some(url),
    })
}
