use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use sitectl_core::cluster::{self, ClusterSpec};
use sitectl_core::config::SiteLayout;
use sitectl_core::{Result, SiteError};

/// One cluster document and the outcome of parsing it.
#[derive(Debug)]
pub struct ClusterDocumentResult {
    pub path: PathBuf,
    pub result: Result<ClusterSpec>,
}

fn is_cluster_document(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

/// Cluster document paths of a site, sorted by file name. A site without
/// a clusters directory has no clusters.
pub fn cluster_document_paths(site: &SiteLayout) -> Result<Vec<PathBuf>> {
    let dir = site.clusters_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(site = %site.code, dir = %dir.display(), "site has no clusters directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SiteError::io(&dir, e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SiteError::io(&dir, e))?.path();
        if is_cluster_document(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Parse every cluster document, keeping each file's error instead of
/// stopping at the first one.
pub fn scan_cluster_documents(site: &SiteLayout) -> Result<Vec<ClusterDocumentResult>> {
    let mut results = Vec::new();
    for path in cluster_document_paths(site)? {
        let result = std::fs::read_to_string(&path)
            .map_err(|e| SiteError::io(&path, e))
            .and_then(|doc| {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                cluster::parse(&site.code, stem, &doc)
            });
        results.push(ClusterDocumentResult { path, result });
    }
    Ok(results)
}

/// Load every cluster spec of a site. A single bad document fails the
/// whole site; a partial plan is never produced.
pub fn load_cluster_specs(site: &SiteLayout) -> Result<Vec<ClusterSpec>> {
    let mut specs = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for doc in scan_cluster_documents(site)? {
        let spec = doc.result?;
        if let Some(first) = seen.get(&spec.cluster_name) {
            return Err(SiteError::DuplicateCluster {
                cluster: spec.cluster_name,
                first: first.clone(),
                second: doc.path,
            });
        }
        debug!(
            site = %site.code,
            cluster = %spec.cluster_name,
            control_planes = spec.control_plane_count,
            workers = spec.worker_count,
            size = %spec.size_class,
            "loaded cluster spec"
        );
        seen.insert(spec.cluster_name.clone(), doc.path);
        specs.push(spec);
    }
    Ok(specs)
}
