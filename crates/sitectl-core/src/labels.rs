//! Label contract between provisioned machines and orchestration-side
//! machine-selection filters.
//!
//! The provisioning layer stamps exactly these three labels on every VM it
//! creates for a group, and each cluster role's selector must name exactly
//! the same triple. Any drift (extra key, missing key, different descriptor
//! formatting) means machines are never selected, and nothing on this side
//! of the boundary can observe that.

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterSpec;
use crate::plan::{Role, VmConfigGroup};
use crate::platform::Platform;
use crate::size;

pub const LABEL_SITE: &str = "site";
pub const LABEL_PLATFORM: &str = "platform";
pub const LABEL_SIZE_CLASS: &str = "size_class";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelTriple {
    pub site: String,
    pub platform: Platform,
    pub size_class: String,
}

impl LabelTriple {
    /// Labels stamped on the VMs of one aggregated group.
    pub fn for_group(site: &str, platform: Platform, group: &VmConfigGroup) -> Self {
        Self {
            site: site.to_string(),
            platform,
            size_class: size::format(&group.size_class()),
        }
    }

    /// Labels a cluster's machine selector must match. Both roles of a
    /// cluster share one size class.
    pub fn for_cluster(spec: &ClusterSpec, platform: Platform) -> Self {
        Self {
            site: spec.site_code.clone(),
            platform,
            size_class: size::format(&spec.size_class),
        }
    }

    /// `(key, value)` pairs in key order.
    pub fn labels(&self) -> [(&'static str, String); 3] {
        [
            (LABEL_PLATFORM, self.platform.to_string()),
            (LABEL_SITE, self.site.clone()),
            (LABEL_SIZE_CLASS, self.size_class.clone()),
        ]
    }

    /// Machine-selection filter: `platform=<p>,site=<s>,size_class=<d>`.
    pub fn selector(&self) -> String {
        self.labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Selector for one role of one cluster, as the orchestration layer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelector {
    pub cluster: String,
    pub role: Role,
    pub count: u32,
    pub labels: LabelTriple,
}

/// Selectors for every role of a cluster that has at least one node.
pub fn cluster_selectors(spec: &ClusterSpec, platform: Platform) -> Vec<RoleSelector> {
    let labels = LabelTriple::for_cluster(spec, platform);
    [
        (Role::ControlPlane, spec.control_plane_count),
        (Role::Worker, spec.worker_count),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(role, count)| RoleSelector {
        cluster: spec.cluster_name.clone(),
        role,
        count,
        labels: labels.clone(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::SizeClass;

    fn spec(cp: u32, workers: u32) -> ClusterSpec {
        ClusterSpec {
            site_code: "dk1d".to_string(),
            cluster_name: "web".to_string(),
            control_plane_count: cp,
            worker_count: workers,
            size_class: SizeClass::new(4, 8192),
            disk_gb: 50,
            kubernetes_version: "v1.32.0".to_string(),
            platform_image_version: "1.9.0".to_string(),
        }
    }

    #[test]
    fn test_selector_format() {
        let triple = LabelTriple::for_cluster(&spec(3, 5), Platform::Proxmox);
        assert_eq!(triple.selector(), "platform=proxmox,site=dk1d,size_class=4x8");
    }

    #[test]
    fn test_group_and_cluster_triples_agree() {
        let s = spec(3, 5);
        let group = VmConfigGroup {
            role: Role::Worker,
            cpu: 4,
            memory_mb: 8192,
            disk_gb: 50,
            platform_image_version: "1.9.0".to_string(),
            count: 5,
            clusters: vec!["web".to_string()],
        };
        assert_eq!(
            LabelTriple::for_group("dk1d", Platform::Vsphere, &group),
            LabelTriple::for_cluster(&s, Platform::Vsphere)
        );
    }

    #[test]
    fn test_labels_are_exactly_three() {
        let triple = LabelTriple::for_cluster(&spec(1, 1), Platform::Vsphere);
        let keys: Vec<&str> = triple.labels().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["platform", "site", "size_class"]);
    }

    #[test]
    fn test_cluster_selectors_skip_empty_roles() {
        let sels = cluster_selectors(&spec(0, 3), Platform::Proxmox);
        assert_eq!(sels.len(), 1);
        assert_eq!(sels[0].role, Role::Worker);
        assert_eq!(sels[0].count, 3);

        let sels = cluster_selectors(&spec(1, 3), Platform::Proxmox);
        assert_eq!(sels.len(), 2);
        assert_eq!(sels[0].role, Role::ControlPlane);
    }
}
