//! # sitectl: site resource reconciliation for Talos Kubernetes clusters
//!
//! Facade crate that re-exports the sitectl workspace crates so consumers
//! can depend on a single `sitectl` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | sitectl-core | Size classes, cluster specs, plan types, labels, site layout |
//! | [`engine`] | sitectl-engine | Boot image registry, aggregation, plan writer, site lock |
//! | [`cli`] | sitectl-cli | Clap commands, output rendering, logging setup |

pub use sitectl_cli as cli;
pub use sitectl_core as core;
pub use sitectl_engine as engine;
