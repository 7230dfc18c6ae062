pub mod error;
pub mod types;

// Re-export commonly used types and errors
pub use error::{AttestorError, Result};

pub use types::{
    AttestRequest, AttestResponse, AttestationData, ConfigureRequest, ConfigureResponse,
    GlobalConfig, IidAttestationData, InstanceIdentityDocument, PluginInfo,
};

/// Version information for the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Attestation data type tag and the name exposed to agent path templates.
pub const PLUGIN_NAME: &str = "aws_iid";

/// Environment fallback for the access key id when the config sets no keys.
pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";

/// Environment fallback for the secret access key when the config sets no keys.
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
