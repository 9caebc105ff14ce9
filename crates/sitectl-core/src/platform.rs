use serde::{Deserialize, Serialize};

/// Hypervisor platform a site's VMs are provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Proxmox,
    Vsphere,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxmox => "proxmox",
            Self::Vsphere => "vsphere",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
