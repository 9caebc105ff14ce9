use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};

use sitectl_core::config::{self, SiteLayout, Workspace};
use sitectl_core::plan::InfrastructurePlan;
use sitectl_core::size;
use sitectl_engine::site;
use sitectl_engine::{ImageRegistry, MarkerRegistry, RegisterOutcome};

#[derive(Parser)]
#[command(
    name = "sitectl",
    version,
    about = "Reconcile per-cluster specs into a site's VM provisioning plan"
)]
struct Cli {
    /// Workspace root containing sitectl.toml and the sites directory
    /// [default: $SITECTL_ROOT or the current directory]
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output format: table, json, yaml
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Log format: human, json
    #[arg(long, global = true, default_value = "human")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a site's clusters into a VM plan without writing it
    Plan {
        /// Site code, e.g. dk1d
        site: String,
    },
    /// Aggregate a site's clusters and write the plan into its Terraform variables
    Reconcile {
        /// Site code, e.g. dk1d
        site: String,
    },
    /// Parse every cluster spec of a site and report problems
    Validate {
        /// Site code, e.g. dk1d
        site: String,
    },
    /// Show the machine selector labels each cluster role must use
    Labels {
        /// Site code, e.g. dk1d
        site: String,
    },
    /// Manage prepared Talos boot images
    Image {
        #[command(subcommand)]
        action: ImageCmd,
    },
    /// Resolve a <CPU>x<MEMORY-GB> size descriptor
    Size {
        /// Descriptor, e.g. 4x8
        descriptor: String,
    },
}

#[derive(Subcommand)]
enum ImageCmd {
    /// Record the image reference prepared for a Talos version
    Register {
        /// Site code, e.g. dk1d
        site: String,
        /// Talos version, e.g. 1.9.0
        version: String,
        /// Reference the provisioning tool boots from
        reference: String,
    },
    /// List registered images for a site
    List {
        /// Site code, e.g. dk1d
        site: String,
    },
}

/// Resolved workspace shared by every site command.
struct Session {
    workspace: Workspace,
    registry: MarkerRegistry,
    format: OutputFormat,
}

impl Session {
    fn load(root: Option<PathBuf>, format: OutputFormat) -> Result<Self> {
        let root = config::resolve_root(root);
        let workspace = Workspace::load(&root)
            .with_context(|| format!("Failed to load workspace at {}", root.display()))?;
        debug!(
            root = %workspace.root.display(),
            sites_dir = %workspace.sites_dir.display(),
            "loaded workspace"
        );
        let registry = MarkerRegistry::for_workspace(&workspace);
        Ok(Self {
            workspace,
            registry,
            format,
        })
    }

    fn site(&self, code: &str) -> Result<SiteLayout> {
        let site = self.workspace.site(code)?;
        if !site.dir.is_dir() {
            bail!("Site {:?} not found at {}", code, site.dir.display());
        }
        Ok(site)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(LogFormat::from_str_arg(&cli.log_format));
    let format = OutputFormat::from_str_arg(&cli.output);

    let root = cli.root;
    let session = || Session::load(root.clone(), format);

    match cli.command {
        Commands::Plan { site } => cmd_plan(&session()?, &site),
        Commands::Reconcile { site } => cmd_reconcile(&session()?, &site),
        Commands::Validate { site } => cmd_validate(&session()?, &site),
        Commands::Labels { site } => cmd_labels(&session()?, &site),
        Commands::Image { action } => cmd_image(&session()?, action),
        Commands::Size { descriptor } => cmd_size(&descriptor, format),
    }
}

// ============================================================================
// Plan / reconcile
// ============================================================================

#[derive(Serialize, Tabled)]
struct GroupRow {
    role: String,
    count: u32,
    size: String,
    cpu: u32,
    memory_mb: u32,
    disk_gb: u32,
    talos: String,
    clusters: String,
}

fn group_rows(plan: &InfrastructurePlan) -> Vec<GroupRow> {
    plan.vm_config_groups
        .iter()
        .map(|g| GroupRow {
            role: g.role.to_string(),
            count: g.count,
            size: g.size_class().to_string(),
            cpu: g.cpu,
            memory_mb: g.memory_mb,
            disk_gb: g.disk_gb,
            talos: g.platform_image_version.clone(),
            clusters: g.clusters.join(","),
        })
        .collect()
}

fn cmd_plan(ctx: &Session, code: &str) -> Result<()> {
    let site = ctx.site(code)?;
    let plan = sitectl_engine::plan_site(&site, &ctx.registry)
        .with_context(|| format!("Failed to plan site {}", code))?;

    output::render_document(&plan, &group_rows(&plan), ctx.format)?;
    if ctx.format == OutputFormat::Table {
        println!("Total nodes: {}", plan.total_node_count);
        for (version, reference) in &plan.image_version_map {
            println!("Talos {}: {}", version, reference);
        }
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct ReportRow {
    site: String,
    platform: String,
    clusters: usize,
    groups: usize,
    nodes: u32,
    artifact: String,
    backup: String,
}

fn cmd_reconcile(ctx: &Session, code: &str) -> Result<()> {
    let site = ctx.site(code)?;
    let report = sitectl_engine::reconcile_site(&site, &ctx.registry)
        .with_context(|| format!("Failed to reconcile site {}", code))?;

    let row = ReportRow {
        site: report.site_code.clone(),
        platform: report.platform.to_string(),
        clusters: report.clusters,
        groups: report.groups,
        nodes: report.total_node_count,
        artifact: report.artifact.display().to_string(),
        backup: report.backup.display().to_string(),
    };
    output::render_document(&report, &[row], ctx.format)
}

// ============================================================================
// Validate / labels
// ============================================================================

#[derive(Serialize, Tabled)]
struct ValidateRow {
    file: String,
    cluster: String,
    nodes: String,
    status: String,
}

fn cmd_validate(ctx: &Session, code: &str) -> Result<()> {
    let site = ctx.site(code)?;
    let results = site::scan_cluster_documents(&site)
        .with_context(|| format!("Failed to read cluster specs for site {}", code))?;

    let mut failures = 0;
    let rows: Vec<ValidateRow> = results
        .iter()
        .map(|doc| {
            let file = doc
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &doc.result {
                Ok(spec) => ValidateRow {
                    file,
                    cluster: spec.cluster_name.clone(),
                    nodes: format!(
                        "{}cp+{}w {} {}GB",
                        spec.control_plane_count, spec.worker_count, spec.size_class, spec.disk_gb
                    ),
                    status: "ok".to_string(),
                },
                Err(e) => {
                    failures += 1;
                    ValidateRow {
                        file,
                        cluster: "-".to_string(),
                        nodes: "-".to_string(),
                        status: e.to_string(),
                    }
                }
            }
        })
        .collect();

    output::render_list(&rows, ctx.format)?;
    if failures > 0 {
        bail!(
            "{} of {} cluster specs in site {} are invalid",
            failures,
            rows.len(),
            code
        );
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct SelectorRow {
    cluster: String,
    role: String,
    count: u32,
    selector: String,
}

fn cmd_labels(ctx: &Session, code: &str) -> Result<()> {
    let site = ctx.site(code)?;
    let selectors = sitectl_engine::site_selectors(&site)
        .with_context(|| format!("Failed to derive labels for site {}", code))?;

    match ctx.format {
        OutputFormat::Table => {
            let rows: Vec<SelectorRow> = selectors
                .iter()
                .map(|s| SelectorRow {
                    cluster: s.cluster.clone(),
                    role: s.role.to_string(),
                    count: s.count,
                    selector: s.labels.selector(),
                })
                .collect();
            output::render_list(&rows, ctx.format)
        }
        _ => output::render_document(&selectors, &[] as &[SelectorRow], ctx.format),
    }
}

// ============================================================================
// Images
// ============================================================================

#[derive(Serialize, Tabled)]
struct ImageRow {
    version: String,
    reference: String,
}

fn cmd_image(ctx: &Session, action: ImageCmd) -> Result<()> {
    match action {
        ImageCmd::Register {
            site,
            version,
            reference,
        } => {
            ctx.site(&site)?;
            let outcome = ctx
                .registry
                .register(&site, &version, &reference)
                .with_context(|| format!("Failed to register Talos {} for site {}", version, site))?;
            match outcome {
                RegisterOutcome::Created => {
                    println!("Registered Talos {} for {}: {}", version, site, reference)
                }
                RegisterOutcome::Unchanged => {
                    println!("Talos {} for {} already registered", version, site)
                }
                RegisterOutcome::Replaced { previous } => println!(
                    "Replaced Talos {} for {}: {} (was {})",
                    version, site, reference, previous
                ),
            }
            Ok(())
        }
        ImageCmd::List { site } => {
            ctx.site(&site)?;
            let rows: Vec<ImageRow> = ctx
                .registry
                .list(&site)?
                .into_iter()
                .map(|(version, reference)| ImageRow { version, reference })
                .collect();
            output::render_list(&rows, ctx.format)
        }
    }
}

// ============================================================================
// Size
// ============================================================================

#[derive(Serialize, Tabled)]
struct SizeRow {
    size_class: String,
    cpu: u32,
    memory_mb: u32,
}

fn cmd_size(descriptor: &str, format: OutputFormat) -> Result<()> {
    let size = size::parse(descriptor)?;
    let row = SizeRow {
        size_class: size.to_string(),
        cpu: size.cpu,
        memory_mb: size.memory_mb,
    };
    output::render_list(&[row], format)
}
