//! EC2 cross-check of a signature-verified claim.
//!
//! A valid signature only proves AWS issued the document. The cross-check asks
//! EC2 whether the claimed instance is still wired the way an unmodified
//! instance is, which defeats two known spoofing techniques:
//!
//! - attaching a secondary network interface to reach the server from an
//!   instance other than the one that fetched the document
//! - moving a root volume (and the agent state on it) to another instance

use crate::config::Credentials;
use crate::ec2_client::{InstanceDescription, InventoryFactory, RootDeviceType};
use crate::signature::InstanceClaim;
use crate::{AttestorError, Result};
use serde::Deserialize;
use tracing::debug;

/// Default tolerance between the primary interface and root volume attach times.
pub const DEFAULT_MAX_ATTACH_TIME_DISPARITY_SECS: u64 = 60;

/// Rule applied to the instance's root storage when the block device check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockDevicePolicy {
    /// Instance-store roots pass. EBS roots must have been attached at the
    /// same time as NetworkInterface[0], within the configured tolerance.
    #[default]
    AttachTime,
    /// Only instance-store roots are accepted.
    InstanceStoreOnly,
    /// Only EBS roots are accepted.
    EbsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCheckPolicy {
    pub skip_ec2_attest_calling: bool,
    pub skip_block_device: bool,
    pub block_device_policy: BlockDevicePolicy,
    pub max_attach_time_disparity_secs: u64,
}

impl Default for CrossCheckPolicy {
    fn default() -> Self {
        Self {
            skip_ec2_attest_calling: false,
            skip_block_device: false,
            block_device_policy: BlockDevicePolicy::default(),
            max_attach_time_disparity_secs: DEFAULT_MAX_ATTACH_TIME_DISPARITY_SECS,
        }
    }
}

/// Run the cross-check for a claim, querying EC2 at most once.
pub async fn cross_check(
    claim: &InstanceClaim,
    policy: &CrossCheckPolicy,
    credentials: Option<&Credentials>,
    inventory: &dyn InventoryFactory,
) -> Result<()> {
    if policy.skip_ec2_attest_calling {
        debug!(
            instance_id = claim.instance_id(),
            "skipping EC2 cross-check"
        );
        return Ok(());
    }

    let client = inventory.client(claim.region(), credentials).await?;
    let description = client.describe_instance(claim.instance_id()).await?;
    evaluate(&description, policy)
}

/// Apply the policy to an instance record.
pub fn evaluate(description: &InstanceDescription, policy: &CrossCheckPolicy) -> Result<()> {
    let primary = description.network_interfaces.first().ok_or_else(|| {
        AttestorError::DeviceIndex("instance has no network interfaces".to_string())
    })?;
    match primary.device_index {
        Some(0) => {}
        Some(index) => {
            return Err(AttestorError::DeviceIndex(format!(
                "found device index {}",
                index
            )))
        }
        None => {
            return Err(AttestorError::DeviceIndex(
                "network interface has no attachment device index".to_string(),
            ))
        }
    }

    if policy.skip_block_device {
        return Ok(());
    }

    match policy.block_device_policy {
        BlockDevicePolicy::AttachTime => {
            check_root_attach_time(description, primary.attach_time, policy)
        }
        BlockDevicePolicy::InstanceStoreOnly => {
            require_root_type(description, RootDeviceType::InstanceStore)
        }
        BlockDevicePolicy::EbsOnly => require_root_type(description, RootDeviceType::Ebs),
    }
}

fn require_root_type(description: &InstanceDescription, expected: RootDeviceType) -> Result<()> {
    if description.root_device_type.as_ref() == Some(&expected) {
        return Ok(());
    }
    Err(AttestorError::StorageDevice(format!(
        "root device type is {:?}, expected {:?}",
        description.root_device_type, expected
    )))
}

fn check_root_attach_time(
    description: &InstanceDescription,
    interface_attach_time: Option<i64>,
    policy: &CrossCheckPolicy,
) -> Result<()> {
    if description.root_device_type == Some(RootDeviceType::InstanceStore) {
        return Ok(());
    }

    let root_name = description.root_device_name.as_deref().ok_or_else(|| {
        AttestorError::StorageDevice("instance has no root device name".to_string())
    })?;
    let root = description
        .block_devices
        .iter()
        .find(|b| b.device_name.as_deref() == Some(root_name))
        .ok_or_else(|| {
            AttestorError::StorageDevice(format!(
                "failed to locate the root device block mapping with name {:?}",
                root_name
            ))
        })?;

    let (Some(interface_time), Some(root_time)) = (interface_attach_time, root.attach_time) else {
        return Err(AttestorError::StorageDevice(
            "missing attach time on NetworkInterface[0] or the root block device".to_string(),
        ));
    };

    let disparity = interface_time.abs_diff(root_time);
    if disparity > policy.max_attach_time_disparity_secs {
        return Err(AttestorError::StorageDevice(format!(
            "root BlockDeviceMapping and NetworkInterface[0] attach times differ by {} seconds",
            disparity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ebs_backed, instance_store, MockInventory};
    use iid_attestor_common::InstanceIdentityDocument;

    fn policy() -> CrossCheckPolicy {
        CrossCheckPolicy::default()
    }

    fn claim() -> InstanceClaim {
        InstanceClaim::from_document(InstanceIdentityDocument {
            account_id: "test-account".to_string(),
            instance_id: "test-instance".to_string(),
            region: "test-region".to_string(),
        })
    }

    #[test]
    fn test_instance_store_root_passes() {
        evaluate(&instance_store("i", 0), &policy()).unwrap();
    }

    #[test]
    fn test_non_zero_device_index_rejected() {
        let err = evaluate(&instance_store("i", 1), &policy()).unwrap_err();
        assert!(matches!(err, AttestorError::DeviceIndex(_)));

        // Independent of the storage sub-check.
        let skip = CrossCheckPolicy {
            skip_block_device: true,
            ..policy()
        };
        let err = evaluate(&ebs_backed("i", 2, 100, 100), &skip).unwrap_err();
        assert!(matches!(err, AttestorError::DeviceIndex(_)));
    }

    #[test]
    fn test_missing_interface_rejected() {
        let mut desc = instance_store("i", 0);
        desc.network_interfaces.clear();
        assert!(matches!(
            evaluate(&desc, &policy()),
            Err(AttestorError::DeviceIndex(_))
        ));

        let mut desc = instance_store("i", 0);
        desc.network_interfaces[0].device_index = None;
        assert!(matches!(
            evaluate(&desc, &policy()),
            Err(AttestorError::DeviceIndex(_))
        ));
    }

    #[test]
    fn test_ebs_root_attached_with_interface_passes() {
        evaluate(&ebs_backed("i", 0, 1_000, 1_030), &policy()).unwrap();
    }

    #[test]
    fn test_ebs_root_attached_later_rejected() {
        let err = evaluate(&ebs_backed("i", 0, 1_000, 5_000), &policy()).unwrap_err();
        assert!(matches!(err, AttestorError::StorageDevice(_)));
        assert!(err.to_string().contains("differ by 4000 seconds"));
    }

    #[test]
    fn test_skip_block_device_ignores_storage() {
        let skip = CrossCheckPolicy {
            skip_block_device: true,
            ..policy()
        };
        evaluate(&ebs_backed("i", 0, 1_000, 5_000), &skip).unwrap();
    }

    #[test]
    fn test_missing_root_mapping_rejected() {
        let mut desc = ebs_backed("i", 0, 1_000, 1_000);
        desc.root_device_name = Some("/dev/sda1".to_string());
        let err = evaluate(&desc, &policy()).unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to locate the root device block mapping"));
    }

    #[test]
    fn test_root_type_policies() {
        let store_only = CrossCheckPolicy {
            block_device_policy: BlockDevicePolicy::InstanceStoreOnly,
            ..policy()
        };
        evaluate(&instance_store("i", 0), &store_only).unwrap();
        assert!(matches!(
            evaluate(&ebs_backed("i", 0, 1, 1), &store_only),
            Err(AttestorError::StorageDevice(_))
        ));

        let ebs_only = CrossCheckPolicy {
            block_device_policy: BlockDevicePolicy::EbsOnly,
            ..policy()
        };
        evaluate(&ebs_backed("i", 0, 1, 1), &ebs_only).unwrap();
        assert!(matches!(
            evaluate(&instance_store("i", 0), &ebs_only),
            Err(AttestorError::StorageDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_skip_issues_no_query() {
        let inventory = MockInventory::new();
        let skip = CrossCheckPolicy {
            skip_ec2_attest_calling: true,
            ..policy()
        };
        cross_check(&claim(), &skip, None, &inventory).await.unwrap();
        assert!(inventory.queries().is_empty());
    }

    #[tokio::test]
    async fn test_query_uses_claim_region_and_instance() {
        let inventory = MockInventory::new().with_instance(instance_store("test-instance", 0));
        cross_check(&claim(), &policy(), None, &inventory)
            .await
            .unwrap();
        assert_eq!(inventory.queries(), vec!["test-instance".to_string()]);
        assert_eq!(inventory.regions(), vec!["test-region".to_string()]);
    }

    #[tokio::test]
    async fn test_query_error_preserved() {
        let inventory = MockInventory::new().with_error("test-instance", "client error");
        let err = cross_check(&claim(), &policy(), None, &inventory)
            .await
            .unwrap_err();
        assert!(matches!(err, AttestorError::InventoryQuery(_)));
        assert!(err.to_string().contains("client error"));
        assert_eq!(inventory.queries().len(), 1);
    }
}
