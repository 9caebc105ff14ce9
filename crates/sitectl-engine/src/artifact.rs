//! Versioned writer for a site's Terraform variables file.
//!
//! The artifact is owned by operators: credentials, endpoints and other
//! hand-written variables live in it and are preserved verbatim. This
//! module only replaces the sections it generated itself, which are
//! fenced by marker comments, and snapshots the previous file before
//! touching it.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use sitectl_core::labels::LabelTriple;
use sitectl_core::naming;
use sitectl_core::plan::InfrastructurePlan;
use sitectl_core::platform::Platform;
use sitectl_core::time;
use sitectl_core::{Result, SiteError};

pub const SECTION_IMAGES: &str = "talos_image_ids";
pub const SECTION_VMS: &str = "vm_configs";

const BEGIN_PREFIX: &str = "# >>> sitectl:";
const BEGIN_SUFFIX: &str = " >>>";
const END_PREFIX: &str = "# <<< sitectl:";
const END_SUFFIX: &str = " <<<";
const GENERATED_PREFIX: &str = "# generated at ";

/// Give up looking for a free backup name after this many collisions.
const MAX_BACKUP_ATTEMPTS: u32 = 1000;

fn begin_marker(section: &str) -> String {
    format!("{}{}{}", BEGIN_PREFIX, section, BEGIN_SUFFIX)
}

fn end_marker(section: &str) -> String {
    format!("{}{}{}", END_PREFIX, section, END_SUFFIX)
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub artifact: PathBuf,
    pub backup: PathBuf,
    pub generated_at: String,
}

/// Write `plan` into the artifact at `path`, stamping the current time.
pub fn write(
    site_code: &str,
    platform: Platform,
    plan: &InfrastructurePlan,
    path: &Path,
) -> Result<WriteOutcome> {
    write_at(site_code, platform, plan, path, Utc::now())
}

/// [`write`] with an explicit generation time.
///
/// Order matters: the artifact must exist and parse before anything is
/// touched, and the backup is taken before the new content is written.
pub fn write_at(
    site_code: &str,
    platform: Platform,
    plan: &InfrastructurePlan,
    path: &Path,
    at: DateTime<Utc>,
) -> Result<WriteOutcome> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            return Err(SiteError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SiteError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(SiteError::io(path, e)),
    };

    let original = std::fs::read(path).map_err(|e| SiteError::io(path, e))?;
    let text = std::str::from_utf8(&original).map_err(|_| SiteError::CorruptArtifact {
        path: path.to_path_buf(),
        detail: "not valid UTF-8".to_string(),
    })?;
    let preserved = strip_generated(text).map_err(|detail| SiteError::CorruptArtifact {
        path: path.to_path_buf(),
        detail,
    })?;

    let backup = write_backup(path, &original, at)?;
    debug!(backup = %backup.display(), "artifact backed up");

    let generated_at = time::rfc3339(at);
    let content = compose(&preserved, &render_sections(site_code, platform, plan, &generated_at));

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".sitectl-")
        .tempfile_in(&dir)
        .map_err(|e| SiteError::io(&dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| SiteError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SiteError::io(tmp.path(), e))?;
    std::fs::set_permissions(tmp.path(), metadata.permissions())
        .map_err(|e| SiteError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| SiteError::io(path, e.error))?;

    info!(
        site = site_code,
        artifact = %path.display(),
        groups = plan.vm_config_groups.len(),
        nodes = plan.total_node_count,
        "wrote infrastructure plan"
    );

    Ok(WriteOutcome {
        artifact: path.to_path_buf(),
        backup,
        generated_at,
    })
}

/// Copy the current artifact bytes to `<artifact>.backup-<stamp>`, adding
/// a numeric suffix if an earlier write in the same second took the name.
fn write_backup(path: &Path, original: &[u8], at: DateTime<Utc>) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SiteError::MissingArtifact {
            path: path.to_path_buf(),
        })?;
    let stamp = time::backup_stamp(at);

    for attempt in 0..MAX_BACKUP_ATTEMPTS {
        let candidate = path.with_file_name(naming::backup_file_name(file_name, &stamp, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(original)
                    .and_then(|_| file.sync_all())
                    .map_err(|e| SiteError::io(&candidate, e))?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(SiteError::io(&candidate, e)),
        }
    }

    Err(SiteError::io(
        path,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free backup file name",
        ),
    ))
}

/// Remove every generated section, returning the hand-authored remainder
/// byte for byte (line endings included) with the trailing blank run dropped.
pub fn strip_generated(text: &str) -> std::result::Result<String, String> {
    let mut kept = String::with_capacity(text.len());
    let mut open: Option<(&str, usize)> = None;

    for (lineno, line) in text.split_inclusive('\n').enumerate() {
        let trimmed = line.trim_end();
        let begin = trimmed
            .strip_prefix(BEGIN_PREFIX)
            .and_then(|rest| rest.strip_suffix(BEGIN_SUFFIX));
        let end = trimmed
            .strip_prefix(END_PREFIX)
            .and_then(|rest| rest.strip_suffix(END_SUFFIX));

        match (open, begin, end) {
            (None, Some(section), _) => open = Some((section, lineno + 1)),
            (Some((section, start)), Some(_), _) => {
                return Err(format!(
                    "section {:?} opened at line {} is not closed before line {}",
                    section,
                    start,
                    lineno + 1
                ));
            }
            (Some((section, _)), None, Some(closing)) if closing == section => open = None,
            (_, None, Some(closing)) => {
                return Err(format!(
                    "unexpected end marker for section {:?} at line {}",
                    closing,
                    lineno + 1
                ));
            }
            (Some(_), None, None) => {}
            (None, None, None) => kept.push_str(line),
        }
    }

    if let Some((section, start)) = open {
        return Err(format!(
            "section {:?} opened at line {} is never closed",
            section, start
        ));
    }

    let len = kept.trim_end_matches(['\n', '\r', ' ', '\t']).len();
    kept.truncate(len);
    Ok(kept)
}

fn compose(preserved: &str, sections: &str) -> String {
    if preserved.is_empty() {
        sections.to_string()
    } else {
        format!("{}\n\n{}", preserved, sections)
    }
}

/// Render both generated sections, separated by a blank line.
pub fn render_sections(
    site_code: &str,
    platform: Platform,
    plan: &InfrastructurePlan,
    generated_at: &str,
) -> String {
    format!(
        "{}\n{}",
        render_images(plan, generated_at),
        render_vm_configs(site_code, platform, plan, generated_at)
    )
}

/// Lines of one generated section, markers and timestamp included.
fn section(name: &str, generated_at: &str, body: Vec<String>) -> String {
    let mut lines = Vec::with_capacity(body.len() + 3);
    lines.push(begin_marker(name));
    lines.push(format!("{}{}", GENERATED_PREFIX, generated_at));
    lines.extend(body);
    lines.push(end_marker(name));
    lines.push(String::new());
    lines.join("\n")
}

fn render_images(plan: &InfrastructurePlan, generated_at: &str) -> String {
    let mut body = Vec::new();
    if plan.image_version_map.is_empty() {
        body.push(format!("{} = {{}}", SECTION_IMAGES));
    } else {
        body.push(format!("{} = {{", SECTION_IMAGES));
        for (version, reference) in &plan.image_version_map {
            body.push(format!("  {} = {}", hcl_string(version), hcl_string(reference)));
        }
        body.push("}".to_string());
    }
    section(SECTION_IMAGES, generated_at, body)
}

fn render_vm_configs(
    site_code: &str,
    platform: Platform,
    plan: &InfrastructurePlan,
    generated_at: &str,
) -> String {
    let mut body = Vec::new();
    if plan.vm_config_groups.is_empty() {
        body.push(format!("{} = []", SECTION_VMS));
    } else {
        body.push(format!("{} = [", SECTION_VMS));
        for group in &plan.vm_config_groups {
            let labels = LabelTriple::for_group(site_code, platform, group);
            body.extend([
                "  {".to_string(),
                format!("    role          = {}", hcl_string(group.role.as_str())),
                format!("    count         = {}", group.count),
                format!("    cpu           = {}", group.cpu),
                format!("    memory        = {}", group.memory_mb),
                format!("    disk          = {}", group.disk_gb),
                format!(
                    "    talos_version = {}",
                    hcl_string(&group.platform_image_version)
                ),
                "    labels = {".to_string(),
            ]);
            for (key, value) in labels.labels() {
                body.push(format!("      {:<10} = {}", key, hcl_string(&value)));
            }
            body.push("    }".to_string());
            body.push("  },".to_string());
        }
        body.push("]".to_string());
    }
    section(SECTION_VMS, generated_at, body)
}

/// Quote a value as an HCL string literal.
fn hcl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                // Escape template interpolation / directives.
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Generated sections of `text` with their `generated at` lines removed,
/// for comparing two writes of the same plan.
pub fn generated_body(text: &str) -> String {
    let mut body = Vec::new();
    let mut inside = false;
    for line in text.lines() {
        if line.starts_with(BEGIN_PREFIX) {
            inside = true;
        }
        if inside && !line.starts_with(GENERATED_PREFIX) {
            body.push(line);
        }
        if line.starts_with(END_PREFIX) {
            inside = false;
        }
    }
    body.join("\n")
}
