//! In-memory collaborators for tests and local runs.
//!
//! `MockInventory` stands in for EC2 and records every query it receives.
//! `MockSigner` signs identity documents with a fixed test key so the
//! signature path can be exercised without AWS's private key.

use crate::config::Credentials;
use crate::ec2_client::{
    BlockDeviceAttachment, InstanceDescription, InstanceInventory, InventoryFactory,
    NetworkAttachment, RootDeviceType,
};
use crate::trust_anchor::TrustAnchor;
use crate::{AttestorError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use iid_attestor_common::{IidAttestationData, InstanceIdentityDocument};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

const TEST_RSA_KEY: &str = include_str!("../testdata/test_rsa_key.pem");
const OTHER_RSA_KEY: &str = include_str!("../testdata/other_rsa_key.pem");

/// Instance-store backed instance with a single network interface.
pub fn instance_store(instance_id: &str, device_index: i32) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance_id.to_string(),
        root_device_type: Some(RootDeviceType::InstanceStore),
        root_device_name: None,
        network_interfaces: vec![NetworkAttachment {
            device_index: Some(device_index),
            attach_time: Some(1_500_000_000),
        }],
        block_devices: vec![],
    }
}

/// EBS backed instance whose root volume is mounted at `/dev/xvda`.
pub fn ebs_backed(
    instance_id: &str,
    device_index: i32,
    interface_attach_time: i64,
    root_attach_time: i64,
) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance_id.to_string(),
        root_device_type: Some(RootDeviceType::Ebs),
        root_device_name: Some("/dev/xvda".to_string()),
        network_interfaces: vec![NetworkAttachment {
            device_index: Some(device_index),
            attach_time: Some(interface_attach_time),
        }],
        block_devices: vec![BlockDeviceAttachment {
            device_name: Some("/dev/xvda".to_string()),
            attach_time: Some(root_attach_time),
        }],
    }
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, std::result::Result<InstanceDescription, String>>,
    queries: Vec<String>,
    regions: Vec<String>,
    credentials: Vec<Option<String>>,
}

/// EC2 stand-in serving canned instance records.
///
/// Acts as its own factory; clones share state.
#[derive(Clone, Default)]
pub struct MockInventory {
    state: Arc<Mutex<MockState>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, description: InstanceDescription) -> Self {
        self.lock()
            .instances
            .insert(description.instance_id.clone(), Ok(description));
        self
    }

    /// Make the describe query for `instance_id` fail with `message`.
    pub fn with_error(self, instance_id: &str, message: &str) -> Self {
        self.lock()
            .instances
            .insert(instance_id.to_string(), Err(message.to_string()));
        self
    }

    /// Instance ids queried so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    /// Regions clients were built for, in order.
    pub fn regions(&self) -> Vec<String> {
        self.lock().regions.clone()
    }

    /// Access key ids clients were built with; `None` for the default chain.
    pub fn access_key_ids(&self) -> Vec<Option<String>> {
        self.lock().credentials.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InstanceInventory for MockInventory {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        let mut state = self.lock();
        state.queries.push(instance_id.to_string());
        match state.instances.get(instance_id) {
            Some(Ok(description)) => Ok(description.clone()),
            Some(Err(message)) => Err(AttestorError::InventoryQuery(message.clone())),
            None => Err(AttestorError::InventoryQuery(format!(
                "InvalidInstanceID.NotFound: The instance ID '{}' does not exist",
                instance_id
            ))),
        }
    }
}

#[async_trait]
impl InventoryFactory for MockInventory {
    async fn client(
        &self,
        region: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn InstanceInventory>> {
        {
            let mut state = self.lock();
            state.regions.push(region.to_string());
            state
                .credentials
                .push(credentials.map(|c| c.access_key_id().to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

/// Signs identity documents with a fixed RSA test key.
#[derive(Clone)]
pub struct MockSigner {
    key: RsaPrivateKey,
}

impl MockSigner {
    pub fn new() -> Self {
        Self::from_pem(TEST_RSA_KEY)
    }

    /// A signer whose key does not match `new()`.
    pub fn other() -> Self {
        Self::from_pem(OTHER_RSA_KEY)
    }

    fn from_pem(pem: &str) -> Self {
        let key = RsaPrivateKey::from_pkcs1_pem(pem).expect("test RSA key must parse");
        Self { key }
    }

    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor::from_public_key(self.key.to_public_key())
    }

    /// RSA PKCS#1 v1.5 signature over SHA-256(message).
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let digest = Sha256::digest(message);
        self.key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .expect("RSA signing failed")
    }

    /// Sign `document` verbatim.
    pub fn sign_raw_document(&self, document: &str) -> IidAttestationData {
        IidAttestationData {
            document: document.to_string(),
            signature: BASE64.encode(self.sign(document.as_bytes())),
        }
    }

    pub fn sign_document(
        &self,
        instance_id: &str,
        account_id: &str,
        region: &str,
    ) -> IidAttestationData {
        let document = InstanceIdentityDocument {
            account_id: account_id.to_string(),
            instance_id: instance_id.to_string(),
            region: region.to_string(),
        };
        let encoded = serde_json::to_string(&document).expect("document serialization failed");
        self.sign_raw_document(&encoded)
    }

    /// Signed attestation payload bytes, ready to submit.
    pub fn payload(&self, instance_id: &str, account_id: &str, region: &str) -> Vec<u8> {
        serde_json::to_vec(&self.sign_document(instance_id, account_id, region))
            .expect("payload serialization failed")
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}
