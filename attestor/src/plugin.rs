//! Attestation orchestrator.
//!
//! Holds the current configuration snapshot and runs one attestation attempt
//! per call: replay gate, payload shape, signature, cross-check, render.

use crate::config::{process_env, EnvLookup, PluginConfig};
use crate::cross_check::cross_check;
use crate::ec2_client::{AwsInventoryFactory, InventoryFactory};
use crate::signature::verify_attestation_data;
use crate::template::render_agent_id;
use crate::trust_anchor::TrustAnchor;
use crate::{AttestorError, Result};
use iid_attestor_common::{
    AttestRequest, AttestResponse, ConfigureRequest, ConfigureResponse, PluginInfo, PLUGIN_NAME,
};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Collaborators injected at construction.
#[derive(Clone)]
pub struct Hooks {
    pub env: EnvLookup,
    pub inventory: Arc<dyn InventoryFactory>,
    /// Replaces the embedded AWS signing certificate when set.
    pub trust_anchor: Option<TrustAnchor>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            env: process_env(),
            inventory: Arc::new(AwsInventoryFactory),
            trust_anchor: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Idle,
    Configured,
}

/// AWS instance identity document node attestor.
pub struct IidAttestorPlugin {
    config: RwLock<Option<Arc<PluginConfig>>>,
    configure_lock: Mutex<()>,
    hooks: Hooks,
}

impl IidAttestorPlugin {
    pub fn new() -> Self {
        Self::with_hooks(Hooks::default())
    }

    pub fn with_hooks(hooks: Hooks) -> Self {
        Self {
            config: RwLock::new(None),
            configure_lock: Mutex::new(()),
            hooks,
        }
    }

    /// Resolve and publish a new configuration.
    ///
    /// On failure the previous configuration, if any, stays in effect.
    pub fn configure(&self, req: &ConfigureRequest) -> Result<ConfigureResponse> {
        let _serialized = self
            .configure_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let trust_anchor = match &self.hooks.trust_anchor {
            Some(anchor) => anchor.clone(),
            None => TrustAnchor::aws_default()?,
        };

        let config = PluginConfig::resolve(
            &req.configuration,
            req.global_config.as_ref(),
            &self.hooks.env,
            trust_anchor,
        )
        .map_err(|e| {
            warn!(code = e.code(), error = %e, "configuration rejected");
            e
        })?;

        info!(
            trust_domain = %config.trust_domain,
            agent_path_template = config.agent_path_template.source(),
            static_credentials = config.credentials.is_some(),
            skip_ec2_attest_calling = config.cross_check.skip_ec2_attest_calling,
            skip_block_device = config.cross_check.skip_block_device,
            block_device_policy = ?config.cross_check.block_device_policy,
            "plugin configured"
        );

        let snapshot = Arc::new(config);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        Ok(ConfigureResponse {})
    }

    pub fn state(&self) -> PluginState {
        match self.snapshot() {
            Some(_) => PluginState::Configured,
            None => PluginState::Idle,
        }
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {}
    }

    /// Attest one agent.
    ///
    /// The only network I/O is the EC2 describe query. Dropping the future
    /// cancels it; no retry is attempted.
    pub async fn attest(&self, req: AttestRequest) -> Result<AttestResponse> {
        let config = self.snapshot().ok_or(AttestorError::NotConfigured)?;
        match self.attest_with(&config, req).await {
            Ok(resp) => {
                info!(agent_id = %resp.base_spiffe_id, "agent attested");
                Ok(resp)
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "attestation rejected");
                Err(e)
            }
        }
    }

    async fn attest_with(&self, config: &PluginConfig, req: AttestRequest) -> Result<AttestResponse> {
        if req.attested_before {
            return Err(AttestorError::Replay);
        }

        let data = req.attestation_data.ok_or(AttestorError::MissingPayload)?;
        if data.data_type != PLUGIN_NAME {
            return Err(AttestorError::UnsupportedType(data.data_type));
        }

        let claim = verify_attestation_data(&data.data, &config.trust_anchor)?;
        debug!(
            instance_id = claim.instance_id(),
            account_id = claim.account_id(),
            region = claim.region(),
            "signature verified"
        );

        cross_check(
            &claim,
            &config.cross_check,
            config.credentials.as_ref(),
            self.hooks.inventory.as_ref(),
        )
        .await?;

        let base_spiffe_id =
            render_agent_id(&config.trust_domain, &config.agent_path_template, &claim)?;
        Ok(AttestResponse {
            valid: true,
            base_spiffe_id,
        })
    }

    fn snapshot(&self) -> Option<Arc<PluginConfig>> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for IidAttestorPlugin {
    fn default() -> Self {
        Self::new()
    }
}
