//! Boot image registry.
//!
//! Records, per site and per Talos version, the reference of an image that
//! an external preparation step has already uploaded to the hypervisor.
//! This module never prepares images itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use sitectl_core::config::{SiteLayout, Workspace};
use sitectl_core::naming;
use sitectl_core::{Result, SiteError};

/// What a `register` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    /// Same reference already recorded; nothing written.
    Unchanged,
    /// A different reference was recorded and has been overwritten.
    Replaced { previous: String },
}

/// Lookup and registration of prepared boot images.
pub trait ImageRegistry {
    /// Reference recorded for `version` at `site`, if any.
    fn lookup(&self, site: &str, version: &str) -> Result<Option<String>>;

    fn is_registered(&self, site: &str, version: &str) -> Result<bool> {
        Ok(self.lookup(site, version)?.is_some())
    }

    /// Record `reference` for `version`. Idempotent for an identical
    /// reference; a different reference replaces the old one.
    fn register(&self, site: &str, version: &str, reference: &str) -> Result<RegisterOutcome>;

    /// All registered `(version, reference)` pairs, sorted by version.
    fn list(&self, site: &str) -> Result<Vec<(String, String)>>;
}

/// Registry backed by marker files at
/// `<sites_dir>/<site>/images/talos-<version>.ref`.
#[derive(Debug, Clone)]
pub struct MarkerRegistry {
    sites_dir: PathBuf,
}

impl MarkerRegistry {
    pub fn new(sites_dir: impl Into<PathBuf>) -> Self {
        Self {
            sites_dir: sites_dir.into(),
        }
    }

    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self::new(&workspace.sites_dir)
    }

    fn images_dir(&self, site: &str) -> Result<PathBuf> {
        naming::validate_site_code(site)?;
        Ok(SiteLayout::new(site, self.sites_dir.join(site)).images_dir())
    }

    pub fn marker_path(&self, site: &str, version: &str) -> Result<PathBuf> {
        naming::validate_image_version(version)?;
        Ok(self.images_dir(site)?.join(naming::image_marker_name(version)))
    }
}

fn read_marker(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let reference = content.trim();
            if reference.is_empty() {
                Ok(None)
            } else {
                Ok(Some(reference.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SiteError::io(path, e)),
    }
}

impl ImageRegistry for MarkerRegistry {
    fn lookup(&self, site: &str, version: &str) -> Result<Option<String>> {
        let path = self.marker_path(site, version)?;
        let found = read_marker(&path)?;
        debug!(site, version, registered = found.is_some(), "boot image lookup");
        Ok(found)
    }

    fn register(&self, site: &str, version: &str, reference: &str) -> Result<RegisterOutcome> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains(['\n', '\r']) {
            return Err(SiteError::InvalidImageReference {
                version: version.to_string(),
            });
        }

        let path = self.marker_path(site, version)?;
        let previous = read_marker(&path)?;
        if previous.as_deref() == Some(reference) {
            debug!(site, version, "boot image already registered");
            return Ok(RegisterOutcome::Unchanged);
        }

        let dir = self.images_dir(site)?;
        std::fs::create_dir_all(&dir).map_err(|e| SiteError::io(&dir, e))?;

        // Write-then-rename so a reader never sees a half-written marker.
        let mut tmp = tempfile::Builder::new()
            .prefix(".marker-")
            .tempfile_in(&dir)
            .map_err(|e| SiteError::io(&dir, e))?;
        writeln!(tmp, "{}", reference).map_err(|e| SiteError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| SiteError::io(&path, e.error))?;

        Ok(match previous {
            None => {
                info!(site, version, reference, "registered boot image");
                RegisterOutcome::Created
            }
            Some(previous) => {
                warn!(site, version, %previous, reference, "replaced boot image reference");
                RegisterOutcome::Replaced { previous }
            }
        })
    }

    fn list(&self, site: &str) -> Result<Vec<(String, String)>> {
        let dir = self.images_dir(site)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SiteError::io(&dir, e)),
        };

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SiteError::io(&dir, e))?;
            let file_name = entry.file_name();
            let Some(version) = file_name.to_str().and_then(naming::version_from_marker_name)
            else {
                continue;
            };
            if let Some(reference) = read_marker(&entry.path())? {
                images.push((version.to_string(), reference));
            }
        }
        images.sort();
        Ok(images)
    }
}
