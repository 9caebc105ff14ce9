// sitectl-cli: Clap commands, output rendering, logging setup
// Depends on sitectl-core, sitectl-engine

pub mod commands;
pub mod logging;
pub mod output;

pub use commands::run;
