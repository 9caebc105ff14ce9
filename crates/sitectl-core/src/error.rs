//! Error taxonomy for a reconciliation pass.
//!
//! Every variant is terminal for the pass that raised it: there is no
//! partial plan and no automatic retry. The operator fixes the triggering
//! condition and re-runs.

use std::path::PathBuf;

use crate::plan::Role;

/// Result alias used throughout the engine.
pub type Result<T, E = SiteError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Size descriptor does not follow the `<CPU>x<MEMORY-GB>` convention.
    #[error("invalid size class {descriptor:?}: {reason}")]
    InvalidSizeClass { descriptor: String, reason: String },

    /// A required cluster spec field is absent, non-numeric, or unknown.
    #[error("cluster {cluster:?} has an incomplete spec: {detail}")]
    IncompleteSpec { cluster: String, detail: String },

    #[error("cluster {cluster:?} has zero control planes and zero workers")]
    EmptyCluster { cluster: String },

    #[error("cluster {cluster:?} is defined twice: {} and {}", .first.display(), .second.display())]
    DuplicateCluster {
        cluster: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("cluster {cluster:?} declares site {found:?} but lives under site {expected:?}")]
    SiteMismatch {
        cluster: String,
        expected: String,
        found: String,
    },

    /// Every required image version that has no registered marker.
    #[error(
        "site {site:?} is missing boot images for Talos version(s): {}",
        .versions.join(", ")
    )]
    MissingBootImage { site: String, versions: Vec<String> },

    #[error(
        "{role} nodes of size {size_class} on Talos {version} request conflicting disk sizes \
         ({first} GB vs {second} GB) across clusters {}",
        .clusters.join(", ")
    )]
    ConflictingDiskSize {
        role: Role,
        size_class: String,
        version: String,
        first: u32,
        second: u32,
        clusters: Vec<String>,
    },

    #[error("infrastructure artifact {} does not exist", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("infrastructure artifact {} is corrupt: {detail}", .path.display())]
    CorruptArtifact { path: PathBuf, detail: String },

    #[error("site config {} does not exist", .path.display())]
    MissingSiteConfig { path: PathBuf },

    #[error("invalid site code {code:?}: {reason}")]
    InvalidSiteCode { code: String, reason: String },

    #[error("invalid Talos image version {version:?}")]
    InvalidImageVersion { version: String },

    #[error("invalid image reference for Talos {version}: must be a non-empty single line")]
    InvalidImageReference { version: String },

    #[error("site {site:?} is locked by another reconciliation")]
    SiteLocked { site: String },

    #[error("failed to parse {}: {detail}", .path.display())]
    Config { path: PathBuf, detail: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SiteError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_boot_image_lists_every_version() {
        let err = SiteError::MissingBootImage {
            site: "dk1d".to_string(),
            versions: vec!["1.10.0".to_string(), "1.9.0".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("1.10.0, 1.9.0"), "got: {}", msg);
        assert!(msg.contains("dk1d"));
    }

    #[test]
    fn test_conflicting_disk_message() {
        let err = SiteError::ConflictingDiskSize {
            role: Role::Worker,
            size_class: "2x4".to_string(),
            version: "1.9.0".to_string(),
            first: 50,
            second: 100,
            clusters: vec!["baseline".to_string(), "web".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("worker nodes of size 2x4"));
        assert!(msg.contains("50 GB vs 100 GB"));
        assert!(msg.contains("baseline, web"));
    }

    #[test]
    fn test_io_helper_keeps_source() {
        let err = SiteError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/tmp/x"));
    }
}
