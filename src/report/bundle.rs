use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::compose::render_student_pdf;
use super::model::ReportCard;
use crate::layout::{Canvas, LayoutContext};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT: &str = "rapord-report-bundle-v1";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub path: String,
    pub student_id: String,
    pub student_name: String,
    pub pages: usize,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub entries: Vec<BundleEntry>,
}

/// File-name friendly form of a student name.
fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "siswa".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes one PDF per student plus a manifest with SHA-256 checksums.
pub fn export_class_bundle(
    ctx: &LayoutContext,
    class_name: &str,
    reports: &[ReportCard],
    out_path: &Path,
) -> anyhow::Result<BundleSummary> {
    if reports.is_empty() {
        return Err(anyhow!("class {} has no students", class_name));
    }

    let mut files = Vec::with_capacity(reports.len());
    let mut entries = Vec::with_capacity(reports.len());
    for (i, report) in reports.iter().enumerate() {
        let canvas = render_student_pdf(ctx, report);
        let pages = canvas.page_count();
        let bytes = canvas.finish();
        let path = format!("reports/{:02}-{}.pdf", i + 1, slug(&report.student.name));
        entries.push(BundleEntry {
            path: path.clone(),
            student_id: report.student.id.clone(),
            student_name: report.student.name.clone(),
            pages,
            bytes: bytes.len(),
            sha256: format!("{:x}", Sha256::digest(&bytes)),
        });
        files.push((path, bytes));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "className": class_name,
        "files": entries,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (path, bytes) in &files {
        zip.start_file(path.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", path))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {}", path))?;
    }
    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(
        class = class_name,
        files = entries.len(),
        path = %out_path.to_string_lossy(),
        "report bundle written"
    );
    Ok(BundleSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: entries.len() + 1,
        entries,
    })
}
