use serde::{Deserialize, Serialize};

/// Attestation data envelope sent by the agent.
///
/// `document` is the JSON identity document exactly as served by the
/// instance metadata service; `signature` is its base64 RSA-SHA256 signature.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IidAttestationData {
    pub document: String,
    pub signature: String,
}

/// The subset of the EC2 instance identity document used for attestation.
///
/// Other fields served by the metadata service are ignored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceIdentityDocument {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "instanceId")]
    pub instance_id: String,
    pub region: String,
}

/// Typed attestation payload as carried by the node attestation stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct AttestationData {
    #[serde(rename = "type")]
    pub data_type: String,
    pub data: Vec<u8>,
}

/// One inbound attestation message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct AttestRequest {
    pub attestation_data: Option<AttestationData>,
    /// Set by the caller when this agent has already attested with this document.
    pub attested_before: bool,
}

/// One outbound attestation message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AttestResponse {
    pub valid: bool,
    pub base_spiffe_id: String,
}

/// Settings supplied by the hosting server rather than the plugin's own config.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct GlobalConfig {
    pub trust_domain: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ConfigureRequest {
    pub configuration: String,
    pub global_config: Option<GlobalConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ConfigureResponse {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct PluginInfo {}
