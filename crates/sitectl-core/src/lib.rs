// sitectl-core: pure types, errors, naming, config
// No internal sitectl dependencies: this is the foundation crate.

pub mod cluster;
pub mod config;
pub mod error;
pub mod labels;
pub mod naming;
pub mod plan;
pub mod platform;
pub mod size;
pub mod time;

pub use error::{Result, SiteError};
