//! RSA trust anchor for instance identity document signatures.
//!
//! The anchor is the public key of the AWS IID signing certificate, compiled
//! into the binary. Configuration replaces the anchor wholesale together with
//! the rest of the plugin state; nothing mutates it in place.

use crate::{AttestorError, Result};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::x509::X509Name;

/// AWS IID RSA-2048 signing certificate (PEM).
///
/// Must hold the certificate AWS publishes for the partition being served.
/// Anything not issued by AWS is refused by `aws_default`.
const AWS_IID_SIGNING_CERT: &[u8] = include_bytes!("../certs/aws_iid_rsa2048.pem");

/// Issuer organization of every AWS IID signing certificate.
const AWS_ORGANIZATION: &str = "Amazon Web Services LLC";

/// Public key used to verify IID signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustAnchor {
    public_key: RsaPublicKey,
}

impl TrustAnchor {
    /// Load the embedded AWS signing certificate.
    pub fn aws_default() -> Result<Self> {
        Self::from_aws_certificate_pem(AWS_IID_SIGNING_CERT)
    }

    /// Extract the RSA public key from a PEM-encoded X.509 certificate.
    ///
    /// Only the subject public key is used; validity dates are not checked,
    /// matching how AWS publishes these certificates.
    pub fn from_certificate_pem(pem: &[u8]) -> Result<Self> {
        load_certificate(pem, false)
    }

    /// Same as `from_certificate_pem`, but the certificate must name AWS as
    /// both subject and issuer organization.
    pub fn from_aws_certificate_pem(pem: &[u8]) -> Result<Self> {
        load_certificate(pem, true)
    }

    pub fn from_public_key(public_key: RsaPublicKey) -> Self {
        Self { public_key }
    }

    /// Verify a PKCS#1 v1.5 RSA signature over the SHA-256 digest of `message`.
    ///
    /// `message` must be the exact signed bytes. A zero-length signature is
    /// rejected here like any other bad signature.
    pub fn verify_sha256(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let digest = Sha256::digest(message);
        self.public_key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .map_err(|e| AttestorError::SignatureVerification(e.to_string()))
    }
}

fn load_certificate(pem: &[u8], require_aws: bool) -> Result<TrustAnchor> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| AttestorError::TrustAnchor(format!("invalid PEM: {}", e)))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| AttestorError::TrustAnchor(format!("invalid certificate: {}", e)))?;

    if require_aws {
        let names_aws = |name: &X509Name<'_>| {
            name.iter_organization()
                .any(|o| o.as_str().map_or(false, |v| v == AWS_ORGANIZATION))
        };
        if !names_aws(cert.subject()) || !names_aws(cert.issuer()) {
            return Err(AttestorError::TrustAnchor(format!(
                "certificate {} is not an AWS IID signing certificate",
                cert.subject()
            )));
        }
    }

    let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
        .map_err(|e| AttestorError::TrustAnchor(format!("certificate key is not RSA: {}", e)))?;

    Ok(TrustAnchor { public_key })
}
