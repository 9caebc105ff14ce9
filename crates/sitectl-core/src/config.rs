use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SiteError};
use crate::naming;
use crate::platform::Platform;

/// Environment variable overriding the workspace root.
pub const ROOT_ENV: &str = "SITECTL_ROOT";
/// Optional workspace-level config file, relative to the root.
pub const WORKSPACE_CONFIG: &str = "sitectl.toml";
pub const DEFAULT_SITES_DIR: &str = "sites";
pub const SITE_CONFIG: &str = "site.toml";
pub const DEFAULT_ARTIFACT: &str = "terraform.tfvars";
pub const CLUSTERS_DIR: &str = "clusters";
pub const IMAGES_DIR: &str = "images";
pub const LOCK_FILE: &str = ".sitectl.lock";

/// Resolve the workspace root.
/// Priority: explicit flag > `SITECTL_ROOT` > current directory.
pub fn resolve_root(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(ROOT_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Contents of `sitectl.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    #[serde(default = "default_sites_dir")]
    pub sites_dir: PathBuf,
}

fn default_sites_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SITES_DIR)
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            sites_dir: default_sites_dir(),
        }
    }
}

/// Contents of a site's `site.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub platform: Platform,
    /// Terraform variables file holding the generated plan, relative to
    /// the site directory unless absolute. An artifact outside the site
    /// directory is also locked next to itself, so sites sharing it are
    /// serialized.
    #[serde(default = "default_artifact")]
    pub artifact: PathBuf,
}

fn default_artifact() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT)
}

impl SiteConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SiteError::MissingSiteConfig {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(SiteError::io(path, e)),
        };
        toml::from_str(&content).map_err(|e| SiteError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

/// A workspace root and the directory holding its sites.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub sites_dir: PathBuf,
}

impl Workspace {
    /// Load `sitectl.toml` from `root` if present, defaults otherwise.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(WORKSPACE_CONFIG);
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| SiteError::Config {
                path: path.clone(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkspaceConfig::default(),
            Err(e) => return Err(SiteError::io(&path, e)),
        };
        Ok(Self::with_config(root, &config))
    }

    pub fn with_config(root: &Path, config: &WorkspaceConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            sites_dir: root.join(&config.sites_dir),
        }
    }

    /// Paths for one site. Validates the site code first so it can never
    /// escape the sites directory.
    pub fn site(&self, code: &str) -> Result<SiteLayout> {
        naming::validate_site_code(code)?;
        Ok(SiteLayout::new(code, self.sites_dir.join(code)))
    }
}

/// On-disk layout of one site directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub code: String,
    pub dir: PathBuf,
}

impl SiteLayout {
    pub fn new(code: &str, dir: PathBuf) -> Self {
        Self {
            code: code.to_string(),
            dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(SITE_CONFIG)
    }

    pub fn clusters_dir(&self) -> PathBuf {
        self.dir.join(CLUSTERS_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.join(IMAGES_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn load_config(&self) -> Result<SiteConfig> {
        SiteConfig::from_file(&self.config_path())
    }

    pub fn artifact_path(&self, config: &SiteConfig) -> PathBuf {
        if config.artifact.is_absolute() {
            config.artifact.clone()
        } else {
            self.dir.join(&config.artifact)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_root_prefers_flag() {
        let root = resolve_root(Some(PathBuf::from("/srv/infra")));
        assert_eq!(root, PathBuf::from("/srv/infra"));
    }

    #[test]
    fn test_workspace_defaults_without_config() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::load(tmp.path()).unwrap();
        assert_eq!(ws.sites_dir, tmp.path().join("sites"));
    }

    #[test]
    fn test_workspace_reads_sites_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(WORKSPACE_CONFIG), "sites_dir = \"omni/sites\"\n")
            .unwrap();
        let ws = Workspace::load(tmp.path()).unwrap();
        assert_eq!(ws.sites_dir, tmp.path().join("omni/sites"));
    }

    #[test]
    fn test_workspace_rejects_bad_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(WORKSPACE_CONFIG), "sitesdir = 3\n").unwrap();
        assert!(matches!(
            Workspace::load(tmp.path()),
            Err(SiteError::Config { .. })
        ));
    }

    #[test]
    fn test_site_rejects_path_escape() {
        let ws = Workspace::with_config(Path::new("/x"), &WorkspaceConfig::default());
        assert!(ws.site("../etc").is_err());
        let site = ws.site("dk1d").unwrap();
        assert_eq!(site.dir, PathBuf::from("/x/sites/dk1d"));
        assert_eq!(site.clusters_dir(), PathBuf::from("/x/sites/dk1d/clusters"));
        assert_eq!(site.images_dir(), PathBuf::from("/x/sites/dk1d/images"));
    }

    #[test]
    fn test_site_config_defaults_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SITE_CONFIG);
        std::fs::write(&path, "platform = \"proxmox\"\n").unwrap();
        let cfg = SiteConfig::from_file(&path).unwrap();
        assert_eq!(cfg.platform, Platform::Proxmox);
        assert_eq!(cfg.artifact, PathBuf::from("terraform.tfvars"));

        let site = SiteLayout::new("dk1d", tmp.path().to_path_buf());
        assert_eq!(site.artifact_path(&cfg), tmp.path().join("terraform.tfvars"));
    }

    #[test]
    fn test_site_config_absolute_artifact() {
        let cfg = SiteConfig {
            platform: Platform::Vsphere,
            artifact: PathBuf::from("/opt/tf/vsphere.tfvars"),
        };
        let site = SiteLayout::new("dk1d", PathBuf::from("/x/sites/dk1d"));
        assert_eq!(site.artifact_path(&cfg), PathBuf::from("/opt/tf/vsphere.tfvars"));
    }

    #[test]
    fn test_site_config_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            SiteConfig::from_file(&tmp.path().join(SITE_CONFIG)),
            Err(SiteError::MissingSiteConfig { .. })
        ));
    }

    #[test]
    fn test_site_config_unknown_platform() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SITE_CONFIG);
        std::fs::write(&path, "platform = \"hyperv\"\n").unwrap();
        assert!(matches!(
            SiteConfig::from_file(&path),
            Err(SiteError::Config { .. })
        ));
    }
}
