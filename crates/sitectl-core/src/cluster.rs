use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};
use crate::size::{self, SizeClass};

/// One cluster's node requirements within a site. Immutable for the
/// duration of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub site_code: String,
    pub cluster_name: String,
    pub control_plane_count: u32,
    pub worker_count: u32,
    pub size_class: SizeClass,
    pub disk_gb: u32,
    pub kubernetes_version: String,
    pub platform_image_version: String,
}

impl ClusterSpec {
    pub fn total_nodes(&self) -> u32 {
        self.control_plane_count + self.worker_count
    }
}

/// On-disk schema of a cluster document. Every field is optional here so
/// that a missing field is reported by name rather than as a bare serde
/// error; unknown fields are rejected outright.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClusterDocument {
    name: Option<String>,
    site: Option<String>,
    control_planes: Option<u32>,
    workers: Option<u32>,
    size: Option<String>,
    disk_gb: Option<u32>,
    kubernetes_version: Option<String>,
    talos_version: Option<String>,
}

/// Parse one cluster document (YAML).
///
/// `site_code` is the site the document was found under and `default_name`
/// the name to use when the document has no `name` field (the file stem).
pub fn parse(site_code: &str, default_name: &str, document: &str) -> Result<ClusterSpec> {
    let doc: ClusterDocument = if document.trim().is_empty() {
        ClusterDocument::default()
    } else {
        serde_yaml::from_str(document).map_err(|e| SiteError::IncompleteSpec {
            cluster: default_name.to_string(),
            detail: e.to_string(),
        })?
    };

    let cluster_name = doc
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_name.to_string());

    if let Some(found) = doc.site.filter(|s| s != site_code) {
        return Err(SiteError::SiteMismatch {
            cluster: cluster_name,
            expected: site_code.to_string(),
            found,
        });
    }

    let missing = |field: &str| SiteError::IncompleteSpec {
        cluster: cluster_name.clone(),
        detail: format!("missing required field `{}`", field),
    };

    let control_plane_count = doc.control_planes.ok_or_else(|| missing("control_planes"))?;
    let worker_count = doc.workers.ok_or_else(|| missing("workers"))?;
    let descriptor = doc.size.ok_or_else(|| missing("size"))?;
    let disk_gb = doc.disk_gb.ok_or_else(|| missing("disk_gb"))?;
    let kubernetes_version =
        non_empty(doc.kubernetes_version).ok_or_else(|| missing("kubernetes_version"))?;
    let platform_image_version =
        non_empty(doc.talos_version).ok_or_else(|| missing("talos_version"))?;

    let size_class = size::parse(descriptor.trim())?;

    if disk_gb == 0 {
        return Err(SiteError::IncompleteSpec {
            cluster: cluster_name,
            detail: "`disk_gb` must be positive".to_string(),
        });
    }
    if control_plane_count.checked_add(worker_count).is_none() {
        return Err(SiteError::IncompleteSpec {
            cluster: cluster_name,
            detail: "node counts out of range".to_string(),
        });
    }
    if control_plane_count == 0 && worker_count == 0 {
        return Err(SiteError::EmptyCluster {
            cluster: cluster_name,
        });
    }

    Ok(ClusterSpec {
        site_code: site_code.to_string(),
        cluster_name,
        control_plane_count,
        worker_count,
        size_class,
        disk_gb,
        kubernetes_version,
        platform_image_version,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
