//! IID signature verification.

use crate::trust_anchor::TrustAnchor;
use crate::{AttestorError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use iid_attestor_common::{IidAttestationData, InstanceIdentityDocument};

/// A signature-verified instance identity claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceClaim {
    document: InstanceIdentityDocument,
    /// The exact signed bytes, kept as received.
    raw_document: String,
}

impl InstanceClaim {
    /// Build a claim from a document, using its JSON encoding as the raw form.
    #[cfg(test)]
    pub(crate) fn from_document(document: InstanceIdentityDocument) -> Self {
        let raw_document = serde_json::to_string(&document).expect("document must serialize");
        Self {
            document,
            raw_document,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.document.account_id
    }

    pub fn instance_id(&self) -> &str {
        &self.document.instance_id
    }

    pub fn region(&self) -> &str {
        &self.document.region
    }

    pub fn document(&self) -> &InstanceIdentityDocument {
        &self.document
    }

    pub fn raw_document(&self) -> &[u8] {
        self.raw_document.as_bytes()
    }
}

/// Verify an attestation payload against the trust anchor.
///
/// Steps, each with its own error kind:
/// 1. parse the `{document, signature}` envelope
/// 2. base64-decode the signature
/// 3. RSA PKCS#1 v1.5 / SHA-256 over the document bytes as received
/// 4. parse the document itself
pub fn verify_attestation_data(payload: &[u8], anchor: &TrustAnchor) -> Result<InstanceClaim> {
    let data: IidAttestationData = serde_json::from_slice(payload)
        .map_err(|e| AttestorError::MalformedPayload(e.to_string()))?;

    // The metadata service wraps the signature across lines. Line breaks are
    // dropped; every other byte must be strict base64. An empty string
    // decodes to zero bytes and is left to the RSA check.
    let encoded: Vec<u8> = data
        .signature
        .bytes()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();
    let signature = BASE64
        .decode(&encoded)
        .map_err(|e| AttestorError::SignatureEncoding(e.to_string()))?;

    anchor.verify_sha256(data.document.as_bytes(), &signature)?;

    let document: InstanceIdentityDocument = serde_json::from_str(&data.document)
        .map_err(|e| AttestorError::MalformedDocument(e.to_string()))?;

    for (field, value) in [
        ("accountId", &document.account_id),
        ("instanceId", &document.instance_id),
        ("region", &document.region),
    ] {
        if value.is_empty() {
            return Err(AttestorError::MalformedDocument(format!(
                "field {} is empty",
                field
            )));
        }
    }

    Ok(InstanceClaim {
        document,
        raw_document: data.document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSigner;

    fn signed_payload(signer: &MockSigner) -> Vec<u8> {
        signer.payload("test-instance", "test-account", "test-region")
    }

    #[test]
    fn test_valid_payload() {
        let signer = MockSigner::new();
        let claim = verify_attestation_data(&signed_payload(&signer), &signer.trust_anchor())
            .unwrap();
        assert_eq!(claim.account_id(), "test-account");
        assert_eq!(claim.instance_id(), "test-instance");
        assert_eq!(claim.region(), "test-region");
    }

    #[test]
    fn test_empty_payload() {
        let anchor = MockSigner::new().trust_anchor();
        let err = verify_attestation_data(b"", &anchor).unwrap_err();
        assert!(matches!(err, AttestorError::MalformedPayload(_)));
        assert!(err.to_string().contains("EOF"));
    }

    #[test]
    fn test_truncated_payload() {
        let signer = MockSigner::new();
        let payload = signed_payload(&signer);
        let err =
            verify_attestation_data(&payload[..payload.len() / 2], &signer.trust_anchor())
                .unwrap_err();
        assert!(matches!(err, AttestorError::MalformedPayload(_)));
    }

    #[test]
    fn test_non_object_payload() {
        let anchor = MockSigner::new().trust_anchor();
        let err = verify_attestation_data(b"[1,2,3]", &anchor).unwrap_err();
        assert!(matches!(err, AttestorError::MalformedPayload(_)));
    }

    #[test]
    fn test_bad_base64_signature() {
        let signer = MockSigner::new();
        let mut data = signer.sign_document("test-instance", "test-account", "test-region");
        data.signature = "bad sig".to_string();
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::SignatureEncoding(_)));
    }

    #[test]
    fn test_line_wrapped_signature() {
        let signer = MockSigner::new();
        let mut data = signer.sign_document("test-instance", "test-account", "test-region");
        let flat = data.signature.clone();
        let lines: Vec<&str> = flat
            .as_bytes()
            .chunks(64)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        data.signature = format!("{}\r\n", lines.join("\n"));
        let payload = serde_json::to_vec(&data).unwrap();

        let claim = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap();
        assert_eq!(claim.instance_id(), "test-instance");
    }

    #[test]
    fn test_other_whitespace_in_signature_rejected() {
        let signer = MockSigner::new();
        let mut data = signer.sign_document("test-instance", "test-account", "test-region");
        data.signature.insert(10, ' ');
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::SignatureEncoding(_)));
    }

    #[test]
    fn test_empty_signature_fails_at_verification() {
        let signer = MockSigner::new();
        let mut data = signer.sign_document("test-instance", "test-account", "test-region");
        data.signature = String::new();
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::SignatureVerification(_)));
        assert!(err
            .to_string()
            .contains("verifying the cryptographic signature"));
    }

    #[test]
    fn test_wrong_key() {
        let signer = MockSigner::new();
        let err = verify_attestation_data(
            &signed_payload(&signer),
            &MockSigner::other().trust_anchor(),
        )
        .unwrap_err();
        assert!(matches!(err, AttestorError::SignatureVerification(_)));
    }

    #[test]
    fn test_tampered_document() {
        let signer = MockSigner::new();
        let mut data = signer.sign_document("test-instance", "test-account", "test-region");
        data.document = data.document.replace("test-instance", "other-instance");
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::SignatureVerification(_)));
    }

    #[test]
    fn test_signature_covers_exact_bytes() {
        // Non-canonical field order and whitespace, as served by the metadata service.
        let signer = MockSigner::new();
        let document = "{\n  \"region\" : \"us-east-1\",\n  \"instanceId\" : \"i-0abc\",\n  \"accountId\" : \"111122223333\"\n}";
        let data = signer.sign_raw_document(document);
        let payload = serde_json::to_vec(&data).unwrap();

        let claim = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap();
        assert_eq!(claim.instance_id(), "i-0abc");
        assert_eq!(claim.raw_document(), document.as_bytes());
    }

    #[test]
    fn test_signed_but_malformed_document() {
        let signer = MockSigner::new();
        let data = signer.sign_raw_document(r#"{"accountId": 12}"#);
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::MalformedDocument(_)));
    }

    #[test]
    fn test_signed_document_with_empty_field() {
        let signer = MockSigner::new();
        let data = signer.sign_document("", "test-account", "test-region");
        let payload = serde_json::to_vec(&data).unwrap();

        let err = verify_attestation_data(&payload, &signer.trust_anchor()).unwrap_err();
        assert!(matches!(err, AttestorError::MalformedDocument(_)));
    }
}
