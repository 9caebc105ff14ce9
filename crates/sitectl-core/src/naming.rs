use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SiteError};

static IMAGE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?[0-9A-Za-z][0-9A-Za-z.+-]*$").unwrap_or_else(|e| panic!("version regex: {e}"))
});

/// Validate a site code: lowercase alphanumeric + hyphens, 1-63 chars.
pub fn validate_site_code(code: &str) -> Result<()> {
    let invalid = |reason: String| SiteError::InvalidSiteCode {
        code: code.to_string(),
        reason,
    };

    if code.is_empty() || code.len() > 63 {
        return Err(invalid(format!("must be 1-63 characters, got {}", code.len())));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("must be lowercase alphanumeric + hyphens".to_string()));
    }
    if code.starts_with('-') || code.ends_with('-') {
        return Err(invalid("must not start or end with a hyphen".to_string()));
    }
    Ok(())
}

/// Validate a Talos image version. Versions become file names, so path
/// separators and dot-only names are rejected.
pub fn validate_image_version(version: &str) -> Result<()> {
    if version.len() > 64 || !IMAGE_VERSION.is_match(version) {
        return Err(SiteError::InvalidImageVersion {
            version: version.to_string(),
        });
    }
    Ok(())
}

/// Marker file name for a registered image: "talos-<version>.ref".
pub fn image_marker_name(version: &str) -> String {
    format!("talos-{}.ref", version)
}

/// Inverse of [`image_marker_name`]. Returns `None` for unrelated files.
pub fn version_from_marker_name(file_name: &str) -> Option<&str> {
    let version = file_name.strip_prefix("talos-")?.strip_suffix(".ref")?;
    validate_image_version(version).ok()?;
    Some(version)
}

/// Backup file name for an artifact: "<name>.backup-<stamp>[-<n>]".
pub fn backup_file_name(artifact_name: &str, stamp: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}.backup-{}", artifact_name, stamp)
    } else {
        format!("{}.backup-{}-{}", artifact_name, stamp, attempt)
    }
}
