use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::size::SizeClass;

/// Node role within a Talos cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(rename = "controlplane")]
    ControlPlane,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlPlane => "controlplane",
            Self::Worker => "worker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Talos version -> image reference the provisioning tool boots from.
pub type ImageVersionMap = BTreeMap<String, String>;

/// Fields that decide whether two node contributions share a bucket.
/// Disk size and the originating clusters are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub role: Role,
    pub cpu: u32,
    pub memory_mb: u32,
    pub platform_image_version: String,
}

/// A bucket of identical VMs aggregated across every cluster of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfigGroup {
    pub role: Role,
    pub cpu: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    pub platform_image_version: String,
    pub count: u32,
    /// Clusters that contributed nodes, in contribution order. Informational.
    #[serde(default)]
    pub clusters: Vec<String>,
}

impl VmConfigGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey {
            role: self.role,
            cpu: self.cpu,
            memory_mb: self.memory_mb,
            platform_image_version: self.platform_image_version.clone(),
        }
    }

    pub fn size_class(&self) -> SizeClass {
        SizeClass::new(self.cpu, self.memory_mb)
    }
}

/// The aggregated provisioning plan for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructurePlan {
    pub site_code: String,
    pub vm_config_groups: Vec<VmConfigGroup>,
    pub image_version_map: ImageVersionMap,
    pub total_node_count: u32,
}

impl InfrastructurePlan {
    /// Sum of group counts. Always equal to `total_node_count` for a plan
    /// built by the aggregator.
    pub fn group_node_count(&self) -> u32 {
        self.vm_config_groups.iter().map(|g| g.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vm_config_groups.is_empty()
    }
}
