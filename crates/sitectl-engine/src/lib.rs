// sitectl-engine: boot image registry, site aggregator, versioned plan writer
// Depends on sitectl-core

pub mod aggregate;
pub mod artifact;
pub mod lock;
pub mod reconcile;
pub mod registry;
pub mod site;

pub use aggregate::aggregate;
pub use reconcile::{ReconcileReport, plan_site, reconcile_site, site_selectors};
pub use registry::{ImageRegistry, MarkerRegistry, RegisterOutcome};
