use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use sitectl_core::cluster::ClusterSpec;
use sitectl_core::plan::{GroupKey, ImageVersionMap, InfrastructurePlan, Role, VmConfigGroup};
use sitectl_core::{Result, SiteError};

use crate::registry::ImageRegistry;

/// Merge every cluster's node requirements into deduplicated VM groups.
///
/// Groups keep first-seen order; within a cluster the control plane
/// contribution precedes the worker one. Two contributions sharing a key
/// but requesting different disk sizes are rejected.
pub fn group_specs(specs: &[ClusterSpec]) -> Result<Vec<VmConfigGroup>> {
    let mut groups: Vec<VmConfigGroup> = Vec::new();
    let mut index: BTreeMap<GroupKey, usize> = BTreeMap::new();

    for spec in specs {
        let contributions = [
            (Role::ControlPlane, spec.control_plane_count),
            (Role::Worker, spec.worker_count),
        ];
        for (role, count) in contributions {
            if count == 0 {
                continue;
            }
            let key = GroupKey {
                role,
                cpu: spec.size_class.cpu,
                memory_mb: spec.size_class.memory_mb,
                platform_image_version: spec.platform_image_version.clone(),
            };

            match index.get(&key) {
                Some(&i) => {
                    let group = &mut groups[i];
                    if group.disk_gb != spec.disk_gb {
                        let mut clusters = group.clusters.clone();
                        clusters.push(spec.cluster_name.clone());
                        return Err(SiteError::ConflictingDiskSize {
                            role,
                            size_class: spec.size_class.to_string(),
                            version: spec.platform_image_version.clone(),
                            first: group.disk_gb,
                            second: spec.disk_gb,
                            clusters,
                        });
                    }
                    group.count = group.count.checked_add(count).ok_or_else(|| {
                        SiteError::IncompleteSpec {
                            cluster: spec.cluster_name.clone(),
                            detail: "aggregated node count out of range".to_string(),
                        }
                    })?;
                    group.clusters.push(spec.cluster_name.clone());
                }
                None => {
                    index.insert(key, groups.len());
                    groups.push(VmConfigGroup {
                        role,
                        cpu: spec.size_class.cpu,
                        memory_mb: spec.size_class.memory_mb,
                        disk_gb: spec.disk_gb,
                        platform_image_version: spec.platform_image_version.clone(),
                        count,
                        clusters: vec![spec.cluster_name.clone()],
                    });
                }
            }
        }
    }

    Ok(groups)
}

/// Build the site's provisioning plan and resolve every required boot image.
///
/// Fails with `MissingBootImage` naming every unregistered version at once.
pub fn aggregate(
    site_code: &str,
    specs: &[ClusterSpec],
    registry: &dyn ImageRegistry,
) -> Result<InfrastructurePlan> {
    let vm_config_groups = group_specs(specs)?;
    let total_node_count = vm_config_groups
        .iter()
        .try_fold(0u32, |total, g| total.checked_add(g.count).ok_or(g))
        .map_err(|g| SiteError::IncompleteSpec {
            cluster: g.clusters.last().cloned().unwrap_or_default(),
            detail: format!("total node count of site {} out of range", site_code),
        })?;

    let required: BTreeSet<&str> = vm_config_groups
        .iter()
        .map(|g| g.platform_image_version.as_str())
        .collect();

    let mut image_version_map = ImageVersionMap::new();
    let mut missing = Vec::new();
    for version in required {
        match registry.lookup(site_code, version)? {
            Some(reference) => {
                image_version_map.insert(version.to_string(), reference);
            }
            None => missing.push(version.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(SiteError::MissingBootImage {
            site: site_code.to_string(),
            versions: missing,
        });
    }

    for group in &vm_config_groups {
        debug!(
            site = site_code,
            role = %group.role,
            cpu = group.cpu,
            memory_mb = group.memory_mb,
            disk_gb = group.disk_gb,
            version = %group.platform_image_version,
            count = group.count,
            "vm group"
        );
    }
    info!(
        site = site_code,
        clusters = specs.len(),
        groups = vm_config_groups.len(),
        nodes = total_node_count,
        "aggregated site plan"
    );

    Ok(InfrastructurePlan {
        site_code: site_code.to_string(),
        vm_config_groups,
        image_version_map,
        total_node_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisterOutcome;
    use sitectl_core::size;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory registry for aggregation tests.
    #[derive(Default)]
    struct MemRegistry {
        images: RefCell<HashMap<(String, String), String>>,
    }

    impl MemRegistry {
        fn with(versions: &[&str]) -> Self {
            let reg = Self::default();
            for v in versions {
                reg.register("dk1d", v, &format!("iso/talos-{}.iso", v))
                    .unwrap();
            }
            reg
        }
    }

    impl ImageRegistry for MemRegistry {
        fn lookup(&self, site: &str, version: &str) -> Result<Option<String>> {
            Ok(self
                .images
                .borrow()
                .get(&(site.to_string(), version.to_string()))
                .cloned())
        }

        fn register(&self, site: &str, version: &str, reference: &str) -> Result<RegisterOutcome> {
            self.images.borrow_mut().insert(
                (site.to_string(), version.to_string()),
                reference.to_string(),
            );
            Ok(RegisterOutcome::Created)
        }

        fn list(&self, _site: &str) -> Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
    }

    fn spec(name: &str, cp: u32, workers: u32, size: &str, version: &str) -> ClusterSpec {
        ClusterSpec {
            site_code: "dk1d".to_string(),
            cluster_name: name.to_string(),
            control_plane_count: cp,
            worker_count: workers,
            size_class: size::parse(size).unwrap(),
            disk_gb: 50,
            kubernetes_version: "v1.32.0".to_string(),
            platform_image_version: version.to_string(),
        }
    }

    fn summary(plan: &InfrastructurePlan) -> Vec<(Role, u32, u32, u32)> {
        plan.vm_config_groups
            .iter()
            .map(|g| (g.role, g.cpu, g.memory_mb, g.count))
            .collect()
    }

    #[test]
    fn test_dk1d_scenario() {
        let specs = vec![
            spec("baseline", 1, 3, "2x4", "1.9.0"),
            spec("web", 3, 5, "4x8", "1.9.0"),
        ];
        let plan = aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])).unwrap();

        assert_eq!(
            summary(&plan),
            vec![
                (Role::ControlPlane, 2, 4096, 1),
                (Role::Worker, 2, 4096, 3),
                (Role::ControlPlane, 4, 8192, 3),
                (Role::Worker, 4, 8192, 5),
            ]
        );
        assert_eq!(plan.total_node_count, 12);
        assert_eq!(plan.image_version_map.len(), 1);
        assert_eq!(plan.image_version_map["1.9.0"], "iso/talos-1.9.0.iso");
    }

    #[test]
    fn test_identical_clusters_collapse() {
        let specs = vec![
            spec("a", 1, 2, "2x4", "1.9.0"),
            spec("b", 3, 4, "2x4", "1.9.0"),
        ];
        let plan = aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])).unwrap();
        assert_eq!(
            summary(&plan),
            vec![(Role::ControlPlane, 2, 4096, 4), (Role::Worker, 2, 4096, 6)]
        );
        assert_eq!(plan.vm_config_groups[0].clusters, vec!["a", "b"]);
    }

    #[test]
    fn test_version_splits_groups() {
        let specs = vec![
            spec("a", 1, 0, "2x4", "1.9.0"),
            spec("b", 1, 0, "2x4", "1.10.0"),
        ];
        let plan = aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0", "1.10.0"])).unwrap();
        assert_eq!(plan.vm_config_groups.len(), 2);
        assert_eq!(plan.image_version_map.len(), 2);
    }

    #[test]
    fn test_zero_count_roles_produce_no_group() {
        let specs = vec![spec("workers-only", 0, 3, "2x4", "1.9.0")];
        let plan = aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])).unwrap();
        assert_eq!(summary(&plan), vec![(Role::Worker, 2, 4096, 3)]);
    }

    #[test]
    fn test_total_matches_spec_sum() {
        let specs = vec![
            spec("a", 1, 3, "2x4", "1.9.0"),
            spec("b", 3, 5, "4x8", "1.9.0"),
            spec("c", 0, 7, "2x4", "1.9.0"),
            spec("d", 5, 0, "8x32", "1.9.0"),
        ];
        let plan = aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])).unwrap();
        let expected: u32 = specs.iter().map(|s| s.total_nodes()).sum();
        assert_eq!(plan.total_node_count, expected);
        assert_eq!(plan.group_node_count(), expected);
    }

    #[test]
    fn test_missing_boot_image_reported() {
        let specs = vec![
            spec("baseline", 1, 3, "2x4", "1.9.0"),
            spec("web", 3, 5, "4x8", "1.10.0"),
        ];
        match aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])) {
            Err(SiteError::MissingBootImage { site, versions }) => {
                assert_eq!(site, "dk1d");
                assert_eq!(versions, vec!["1.10.0"]);
            }
            other => panic!("expected MissingBootImage, got {:?}", other),
        }
    }

    #[test]
    fn test_every_missing_version_reported_once() {
        let specs = vec![
            spec("a", 1, 3, "2x4", "1.9.0"),
            spec("b", 1, 3, "4x8", "1.10.0"),
            spec("c", 1, 3, "8x16", "1.8.3"),
        ];
        match aggregate("dk1d", &specs, &MemRegistry::with(&["1.9.0"])) {
            Err(SiteError::MissingBootImage { versions, .. }) => {
                assert_eq!(versions, vec!["1.10.0", "1.8.3"]);
            }
            other => panic!("expected MissingBootImage, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_disk_sizes_fail() {
        let a = spec("a", 1, 3, "2x4", "1.9.0");
        let mut b = spec("b", 1, 3, "2x4", "1.9.0");
        b.disk_gb = 100;
        match group_specs(&[a, b]) {
            Err(SiteError::ConflictingDiskSize {
                role,
                first,
                second,
                clusters,
                ..
            }) => {
                assert_eq!(role, Role::ControlPlane);
                assert_eq!((first, second), (50, 100));
                assert_eq!(clusters, vec!["a", "b"]);
            }
            other => panic!("expected ConflictingDiskSize, got {:?}", other),
        }
    }

    #[test]
    fn test_same_disk_different_key_is_fine() {
        let a = spec("a", 1, 0, "2x4", "1.9.0");
        let mut b = spec("b", 1, 0, "4x8", "1.9.0");
        b.disk_gb = 100;
        let groups = group_specs(&[a, b]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].disk_gb, 100);
    }

    #[test]
    fn test_site_total_overflow_is_rejected() {
        let specs = vec![
            spec("a", 3_000_000_000, 0, "2x4", "1.9.0"),
            spec("b", 0, 3_000_000_000, "2x4", "1.9.0"),
        ];
        let reg = MemRegistry::with(&["1.9.0"]);
        match aggregate("dk1d", &specs, &reg) {
            Err(SiteError::IncompleteSpec { cluster, detail }) => {
                assert_eq!(cluster, "b");
                assert!(detail.contains("out of range"), "{}", detail);
            }
            other => panic!("expected IncompleteSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_site_gives_empty_plan() {
        let plan = aggregate("dk1d", &[], &MemRegistry::default()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_node_count, 0);
        assert!(plan.image_version_map.is_empty());
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let specs = vec![
            spec("a", 1, 3, "2x4", "1.9.0"),
            spec("b", 3, 5, "4x8", "1.9.0"),
        ];
        let reg = MemRegistry::with(&["1.9.0"]);
        assert_eq!(
            aggregate("dk1d", &specs, &reg).unwrap(),
            aggregate("dk1d", &specs, &reg).unwrap()
        );
    }
}
