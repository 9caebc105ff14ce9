use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use sitectl_core::config::{LOCK_FILE, SiteLayout};
use sitectl_core::{Result, SiteError};

/// Exclusive advisory lock on a site, held for one read-aggregate-write
/// pass. Released when dropped.
#[derive(Debug)]
pub struct SiteLock {
    file: File,
    path: PathBuf,
}

impl SiteLock {
    /// Take the site lock without blocking. A concurrent holder yields
    /// `SiteLocked`.
    pub fn acquire(site: &SiteLayout) -> Result<Self> {
        Self::acquire_at(&site.code, site.lock_path())
    }

    /// Lock an artifact that lives outside its site directory, so sites
    /// sharing one artifact still exclude each other. The lock file sits
    /// next to the artifact as `.<name>.sitectl.lock`.
    pub fn acquire_artifact(site: &SiteLayout, artifact: &Path) -> Result<Self> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::acquire_at(
            &site.code,
            artifact.with_file_name(format!(".{}{}", name, LOCK_FILE)),
        )
    }

    fn acquire_at(site: &str, path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SiteError::io(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(site, lock = %path.display(), "site lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(SiteError::SiteLocked {
                    site: site.to_string(),
                })
            }
            Err(e) => Err(SiteError::io(&path, e)),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for SiteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(lock = %self.path.display(), error = %e, "failed to release site lock");
        }
    }
}
