pub mod config;
pub mod cross_check;
pub mod ec2_client;
pub mod error;
pub mod plugin;
pub mod signature;
pub mod template;
pub mod trust_anchor;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export common types and attestor-specific types
pub use config::{process_env, Credentials, EnvLookup, PluginConfig};
pub use cross_check::{BlockDevicePolicy, CrossCheckPolicy};
pub use ec2_client::{AwsInventoryFactory, InstanceDescription, InstanceInventory, InventoryFactory};
pub use error::{AttestorError, Result};
pub use iid_attestor_common::*;
pub use plugin::{Hooks, IidAttestorPlugin, PluginState};
pub use signature::{verify_attestation_data, InstanceClaim};
pub use template::{AgentPathTemplate, DEFAULT_AGENT_PATH_TEMPLATE};
pub use trust_anchor::TrustAnchor;
