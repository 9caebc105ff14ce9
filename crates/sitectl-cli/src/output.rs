use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table (default).
    #[default]
    Table,
    /// JSON output.
    Json,
    /// YAML output.
    Yaml,
}

impl OutputFormat {
    /// Parse from CLI string argument.
    pub fn from_str_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Table,
        }
    }
}

fn table<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        "(none)".to_string()
    } else {
        tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string()
    }
}

fn structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).context("Failed to serialize output as YAML")
        }
        _ => serde_json::to_string_pretty(value).context("Failed to serialize output as JSON"),
    }
}

/// Format a list of items: a table, or the items themselves as JSON/YAML.
pub fn format_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table(items)),
        _ => structured(items, format),
    }
}

/// Format a document whose table view is a list of rows derived from it
/// (e.g. a plan rendered as one row per VM group).
pub fn format_document<D: Serialize, R: Tabled>(
    document: &D,
    rows: &[R],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table(rows)),
        _ => structured(document, format),
    }
}

/// Render a list of items in the specified output format.
pub fn render_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) -> Result<()> {
    println!("{}", format_list(items, format)?.trim_end());
    Ok(())
}

/// Render a document in the specified output format.
pub fn render_document<D: Serialize, R: Tabled>(
    document: &D,
    rows: &[R],
    format: OutputFormat,
) -> Result<()> {
    println!("{}", format_document(document, rows, format)?.trim_end());
    Ok(())
}
