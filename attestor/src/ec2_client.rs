use crate::config::Credentials;
use crate::{AttestorError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::operation::describe_instances::DescribeInstancesOutput;
use aws_sdk_ec2::types::DeviceType;
use aws_sdk_ec2::Client as Ec2Client;
use aws_types::region::Region;
use std::sync::Arc;

/// Root device type as reported by DescribeInstances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootDeviceType {
    Ebs,
    InstanceStore,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkAttachment {
    pub device_index: Option<i32>,
    /// Unix seconds.
    pub attach_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockDeviceAttachment {
    pub device_name: Option<String>,
    /// Unix seconds; only EBS mappings carry one.
    pub attach_time: Option<i64>,
}

/// The parts of an EC2 instance record the cross-check inspects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub root_device_type: Option<RootDeviceType>,
    pub root_device_name: Option<String>,
    pub network_interfaces: Vec<NetworkAttachment>,
    pub block_devices: Vec<BlockDeviceAttachment>,
}

/// Instance-description capability of the cloud inventory API.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    /// Issue a single describe query. Implementations must not retry.
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription>;
}

/// Builds an inventory client for the region named in a claim.
#[async_trait]
pub trait InventoryFactory: Send + Sync {
    /// `credentials` is `None` when the default provider chain should be used.
    async fn client(
        &self,
        region: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn InstanceInventory>>;
}

/// Extract a meaningful error string from an AWS SDK error, preserving the
/// service error code (e.g. `InvalidInstanceID.NotFound`).
fn format_sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.err();
            match (service_err.code(), service_err.message()) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                _ => DisplayErrorContext(service_err).to_string(),
            }
        }
        other => DisplayErrorContext(other).to_string(),
    }
}

/// EC2 DescribeInstances client
#[derive(Clone)]
pub struct Ec2Inventory {
    client: Ec2Client,
}

impl Ec2Inventory {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Ec2Client::new(config),
        }
    }
}

#[async_trait]
impl InstanceInventory for Ec2Inventory {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| AttestorError::InventoryQuery(format_sdk_error(&e)))?;

        describe_output_to_description(instance_id, &output)
    }
}

fn describe_output_to_description(
    instance_id: &str,
    output: &DescribeInstancesOutput,
) -> Result<InstanceDescription> {
    let instance = output
        .reservations()
        .iter()
        .flat_map(|r| r.instances())
        .next()
        .ok_or_else(|| AttestorError::InstanceNotFound(instance_id.to_string()))?;

    let root_device_type = instance.root_device_type().map(|t| match t {
        DeviceType::Ebs => RootDeviceType::Ebs,
        DeviceType::InstanceStore => RootDeviceType::InstanceStore,
        other => RootDeviceType::Other(other.as_str().to_string()),
    });

    let network_interfaces = instance
        .network_interfaces()
        .iter()
        .map(|iface| {
            let attachment = iface.attachment();
            NetworkAttachment {
                device_index: attachment.and_then(|a| a.device_index()),
                attach_time: attachment.and_then(|a| a.attach_time()).map(|t| t.secs()),
            }
        })
        .collect();

    let block_devices = instance
        .block_device_mappings()
        .iter()
        .map(|mapping| BlockDeviceAttachment {
            device_name: mapping.device_name().map(str::to_string),
            attach_time: mapping
                .ebs()
                .and_then(|ebs| ebs.attach_time())
                .map(|t| t.secs()),
        })
        .collect();

    Ok(InstanceDescription {
        instance_id: instance
            .instance_id()
            .unwrap_or(instance_id)
            .to_string(),
        root_device_type,
        root_device_name: instance.root_device_name().map(str::to_string),
        network_interfaces,
        block_devices,
    })
}

/// Builds real EC2 clients from the AWS SDK.
#[derive(Clone, Debug, Default)]
pub struct AwsInventoryFactory;

#[async_trait]
impl InventoryFactory for AwsInventoryFactory {
    async fn client(
        &self,
        region: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn InstanceInventory>> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(creds) = credentials {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                creds.access_key_id(),
                creds.secret_access_key(),
                None,
                None,
                "iid-attestor-config",
            ));
        }
        let config = loader.load().await;
        Ok(Arc::new(Ec2Inventory::new(&config)))
    }
}
