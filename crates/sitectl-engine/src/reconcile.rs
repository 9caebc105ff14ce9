use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use sitectl_core::config::{SiteConfig, SiteLayout};
use sitectl_core::labels::{self, RoleSelector};
use sitectl_core::plan::InfrastructurePlan;
use sitectl_core::platform::Platform;
use sitectl_core::{Result, SiteError};

use crate::aggregate;
use crate::artifact;
use crate::lock::SiteLock;
use crate::registry::ImageRegistry;
use crate::site;

/// Summary of one completed reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub site_code: String,
    pub platform: Platform,
    pub artifact: PathBuf,
    pub backup: PathBuf,
    pub generated_at: String,
    pub clusters: usize,
    pub groups: usize,
    pub total_node_count: u32,
    pub image_versions: Vec<String>,
}

/// Aggregate a site's plan without writing anything (dry run).
pub fn plan_site(site: &SiteLayout, registry: &dyn ImageRegistry) -> Result<InfrastructurePlan> {
    let specs = site::load_cluster_specs(site)?;
    aggregate::aggregate(&site.code, &specs, registry)
}

/// Run one full pass for a site: lock, load every cluster spec, aggregate,
/// and write the plan into the site's artifact.
///
/// The artifact is checked before the lock file is created, so a site
/// without an artifact is left exactly as it was.
pub fn reconcile_site(site: &SiteLayout, registry: &dyn ImageRegistry) -> Result<ReconcileReport> {
    let config: SiteConfig = site.load_config()?;
    let artifact_path = site.artifact_path(&config);
    if !artifact_path.is_file() {
        return Err(SiteError::MissingArtifact {
            path: artifact_path,
        });
    }

    let _lock = SiteLock::acquire(site)?;
    let _artifact_lock = if artifact_path.parent() == Some(site.dir.as_path()) {
        None
    } else {
        Some(SiteLock::acquire_artifact(site, &artifact_path)?)
    };
    info!(site = %site.code, platform = %config.platform, "reconciling site");

    let specs = site::load_cluster_specs(site)?;
    if specs.is_empty() {
        warn!(site = %site.code, "site has no clusters; writing an empty plan");
    }
    let plan = aggregate::aggregate(&site.code, &specs, registry)?;
    let outcome = artifact::write(&site.code, config.platform, &plan, &artifact_path)?;

    Ok(ReconcileReport {
        site_code: site.code.clone(),
        platform: config.platform,
        artifact: outcome.artifact,
        backup: outcome.backup,
        generated_at: outcome.generated_at,
        clusters: specs.len(),
        groups: plan.vm_config_groups.len(),
        total_node_count: plan.total_node_count,
        image_versions: plan.image_version_map.keys().cloned().collect(),
    })
}

/// Machine selectors every cluster of the site needs on the orchestration
/// side. Reads cluster specs directly, not the aggregated plan.
pub fn site_selectors(site: &SiteLayout) -> Result<Vec<RoleSelector>> {
    let config = site.load_config()?;
    let specs = site::load_cluster_specs(site)?;
    Ok(specs
        .iter()
        .flat_map(|spec| labels::cluster_selectors(spec, config.platform))
        .collect())
}
