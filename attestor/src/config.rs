use crate::cross_check::{BlockDevicePolicy, CrossCheckPolicy, DEFAULT_MAX_ATTACH_TIME_DISPARITY_SECS};
use crate::template::AgentPathTemplate;
use crate::trust_anchor::TrustAnchor;
use crate::{AttestorError, Result};
use iid_attestor_common::{GlobalConfig, ACCESS_KEY_ID_VAR, SECRET_ACCESS_KEY_VAR};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment lookup used for credential fallback.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment. Empty values count as unset.
pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Plugin configuration as written by the operator.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    agent_path_template: Option<String>,
    skip_ec2_attest_calling: bool,
    skip_block_device: bool,
    block_device_policy: BlockDevicePolicy,
    max_attach_time_disparity_secs: Option<u64>,
}

/// Static AWS credentials for the EC2 cross-check.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Immutable snapshot of a successful configuration.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub trust_domain: String,
    /// `None` means the default AWS credential provider chain.
    pub credentials: Option<Credentials>,
    pub agent_path_template: AgentPathTemplate,
    pub cross_check: CrossCheckPolicy,
    pub trust_anchor: TrustAnchor,
}

impl PluginConfig {
    /// Resolve configuration text and host settings into a snapshot.
    ///
    /// Checks run in order: syntax, trust domain, credentials, template.
    pub fn resolve(
        configuration: &str,
        global: Option<&GlobalConfig>,
        env: &EnvLookup,
        trust_anchor: TrustAnchor,
    ) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(configuration).map_err(|e| AttestorError::ConfigSyntax(e.to_string()))?;

        let global = global.ok_or_else(|| {
            AttestorError::MissingGlobalConfig("global configuration is required".to_string())
        })?;
        let trust_domain = validate_trust_domain(&global.trust_domain)?;

        let credentials = resolve_credentials(raw.access_key_id, raw.secret_access_key, env)?;

        let agent_path_template = match raw.agent_path_template.as_deref() {
            Some(source) => AgentPathTemplate::compile(source)?,
            None => AgentPathTemplate::default(),
        };

        Ok(Self {
            trust_domain,
            credentials,
            agent_path_template,
            cross_check: CrossCheckPolicy {
                skip_ec2_attest_calling: raw.skip_ec2_attest_calling,
                skip_block_device: raw.skip_block_device,
                block_device_policy: raw.block_device_policy,
                max_attach_time_disparity_secs: raw
                    .max_attach_time_disparity_secs
                    .unwrap_or(DEFAULT_MAX_ATTACH_TIME_DISPARITY_SECS),
            },
            trust_anchor,
        })
    }
}

fn validate_trust_domain(trust_domain: &str) -> Result<String> {
    if trust_domain.is_empty() {
        return Err(AttestorError::MissingGlobalConfig(
            "trust_domain is required".to_string(),
        ));
    }
    let valid = trust_domain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'));
    if !valid {
        return Err(AttestorError::InvalidTrustDomain(format!(
            "{:?} contains characters outside [a-z0-9._-]",
            trust_domain
        )));
    }
    Ok(trust_domain.to_string())
}

/// Explicit configuration wins; the environment is consulted only when the
/// configuration sets neither key. The resolved pair must be complete or empty.
fn resolve_credentials(
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    env: &EnvLookup,
) -> Result<Option<Credentials>> {
    let access_key_id = access_key_id.filter(|v| !v.is_empty());
    let secret_access_key = secret_access_key.filter(|v| !v.is_empty());

    let (access_key_id, secret_access_key) = match (access_key_id, secret_access_key) {
        (None, None) => (env(ACCESS_KEY_ID_VAR), env(SECRET_ACCESS_KEY_VAR)),
        pair => pair,
    };

    match (access_key_id, secret_access_key) {
        (Some(id), Some(secret)) => Ok(Some(Credentials::new(id, secret))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(AttestorError::CredentialMismatch(
            "configuration missing secret access key, but has access key id".to_string(),
        )),
        (None, Some(_)) => Err(AttestorError::CredentialMismatch(
            "configuration missing access key id, but has secret access key".to_string(),
        )),
    }
}
