use thiserror::Error;

/// Error taxonomy for the IID node attestor.
///
/// Configuration errors are permanent and block attestation until the plugin
/// is reconfigured. Everything else is scoped to a single attestation attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestorError {
    // Configuration errors
    #[error("failed to decode configuration: {0}")]
    ConfigSyntax(String),

    #[error("{0}")]
    MissingGlobalConfig(String),

    #[error("invalid trust domain: {0}")]
    InvalidTrustDomain(String),

    #[error("{0}")]
    CredentialMismatch(String),

    #[error("failed to parse agent svid template: {0}")]
    TemplateCompile(String),

    #[error("failed to load the AWS IID signing certificate: {0}")]
    TrustAnchor(String),

    // Request shape errors
    #[error("not configured")]
    NotConfigured,

    #[error("the IID has been used and is no longer valid")]
    Replay,

    #[error("request missing attestation data")]
    MissingPayload,

    #[error("unexpected attestation data type {0:?}")]
    UnsupportedType(String),

    #[error("failed to unmarshal the attestation data: {0}")]
    MalformedPayload(String),

    // Cryptographic errors
    #[error("failed to decode the IID signature: {0}")]
    SignatureEncoding(String),

    #[error("error verifying the cryptographic signature: {0}")]
    SignatureVerification(String),

    #[error("failed to unmarshal the IID: {0}")]
    MalformedDocument(String),

    // Cross-check errors
    #[error("failed to describe EC2 instance: {0}")]
    InventoryQuery(String),

    #[error("EC2 instance {0:?} not present in the DescribeInstances response")]
    InstanceNotFound(String),

    #[error("failed verifying the EC2 instance's NetworkInterface[0].DeviceIndex is 0: {0}")]
    DeviceIndex(String),

    #[error("failed verifying the EC2 instance's root block device: {0}")]
    StorageDevice(String),

    #[error("failed to render the agent path: {0}")]
    Render(String),
}

impl AttestorError {
    /// Returns a stable numeric error code for this error variant.
    ///
    /// Code ranges:
    /// - 1000-1099: Configuration
    /// - 1100-1199: Request shape (replay, payload, type)
    /// - 1200-1299: Signature and document
    /// - 1300-1399: EC2 cross-check
    /// - 1900-1999: Internal
    pub fn code(&self) -> u16 {
        match self {
            AttestorError::ConfigSyntax(_) => 1000,
            AttestorError::MissingGlobalConfig(_) => 1001,
            AttestorError::InvalidTrustDomain(_) => 1005,
            AttestorError::CredentialMismatch(_) => 1002,
            AttestorError::TemplateCompile(_) => 1003,
            AttestorError::TrustAnchor(_) => 1004,

            AttestorError::NotConfigured => 1100,
            AttestorError::Replay => 1101,
            AttestorError::MissingPayload => 1102,
            AttestorError::UnsupportedType(_) => 1103,
            AttestorError::MalformedPayload(_) => 1104,

            AttestorError::SignatureEncoding(_) => 1200,
            AttestorError::SignatureVerification(_) => 1201,
            AttestorError::MalformedDocument(_) => 1202,

            AttestorError::InventoryQuery(_) => 1300,
            AttestorError::InstanceNotFound(_) => 1301,
            AttestorError::DeviceIndex(_) => 1302,
            AttestorError::StorageDevice(_) => 1303,

            AttestorError::Render(_) => 1900,
        }
    }

    /// Configuration errors persist until the next successful configure call.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AttestorError::ConfigSyntax(_)
                | AttestorError::MissingGlobalConfig(_)
                | AttestorError::InvalidTrustDomain(_)
                | AttestorError::CredentialMismatch(_)
                | AttestorError::TemplateCompile(_)
                | AttestorError::TrustAnchor(_)
        )
    }

    /// Returns a structured error string in the format "E{code}: {redacted_message}".
    pub fn to_structured(&self) -> String {
        format!("E{}: {}", self.code(), self.to_redacted_string())
    }

    /// Returns a message without provider or parser details.
    ///
    /// Cross-check failures and inventory transport failures collapse to the
    /// same text so callers cannot tell a policy rejection from an API error.
    pub fn to_redacted_string(&self) -> String {
        match self {
            AttestorError::ConfigSyntax(_) => "Configuration is malformed".to_string(),
            AttestorError::MissingGlobalConfig(_) => "Trust domain is not configured".to_string(),
            AttestorError::InvalidTrustDomain(_) => "Trust domain is invalid".to_string(),
            AttestorError::CredentialMismatch(_) => "AWS credentials are incomplete".to_string(),
            AttestorError::TemplateCompile(_) => "Agent path template is invalid".to_string(),
            AttestorError::TrustAnchor(_) => "Signing certificate is unusable".to_string(),

            AttestorError::NotConfigured => "Attestor is not configured".to_string(),
            AttestorError::Replay => "Identity document was already used".to_string(),
            AttestorError::MissingPayload => "Attestation data missing".to_string(),
            AttestorError::UnsupportedType(_) => "Unsupported attestation data type".to_string(),
            AttestorError::MalformedPayload(_) => "Attestation data is malformed".to_string(),

            AttestorError::SignatureEncoding(_) => "Signature encoding is invalid".to_string(),
            AttestorError::SignatureVerification(_) => {
                "Signature verification failed".to_string()
            }
            AttestorError::MalformedDocument(_) => "Identity document is malformed".to_string(),

            AttestorError::InventoryQuery(_)
            | AttestorError::InstanceNotFound(_)
            | AttestorError::DeviceIndex(_)
            | AttestorError::StorageDevice(_) => "EC2 attestation failed".to_string(),

            AttestorError::Render(_) => "Internal error".to_string(),
        }
    }
}

/// Result type for attestor operations
pub type Result<T> = std::result::Result<T, AttestorError>;
