//! Auditing annotation geometry.
//!
//! Walks a dataset tree, parses every VOC annotation and records the ones
//! whose declared width is zero. The offending `filename` references are
//! written to `error_files.txt` under the root, overwriting any previous run.

use anyhow::{Context, Result};
use log::{error, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::types::{ANNOTATION_EXT, ERROR_FILE_NAME};
use crate::utils::has_extension;
use crate::voc;

#[derive(Debug, Default)]
pub struct AuditReport {
    /// Annotation files examined.
    pub scanned: usize,
    /// Files that failed to parse, logged and skipped.
    pub parse_failures: usize,
    /// Well-formed documents carrying no size block. Not treated as errors,
    /// but no longer silently invisible either.
    pub missing_size: usize,
    /// Declared filenames of annotations with zero width, in walk order.
    pub degenerate: Vec<String>,
}

/// Walk `root` and audit every annotation file. Per-file failures never
/// abort the walk.
pub fn audit_tree(root: &Path) -> AuditReport {
    let mut report = AuditReport::default();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if !has_extension(path, ANNOTATION_EXT) {
            continue;
        }
        report.scanned += 1;

        let annotation = match voc::read_annotation(path) {
            Ok(annotation) => annotation,
            Err(e) => {
                error!("error parsing annotation file {}: {:#}", path.display(), e);
                report.parse_failures += 1;
                continue;
            }
        };

        match annotation.size {
            Some(size) if size.width == 0 => {
                warn!(
                    "zero-width annotation {} (filename '{}')",
                    path.display(),
                    annotation.filename
                );
                report.degenerate.push(annotation.filename);
            }
            Some(_) => {}
            None => report.missing_size += 1,
        }
    }

    report
}

/// Overwrite `<root>/error_files.txt` with one degenerate filename per line.
pub fn write_error_file(root: &Path, report: &AuditReport) -> Result<PathBuf> {
    let output_path = root.join(ERROR_FILE_NAME);
    let mut writer = BufWriter::new(
        File::create(&output_path)
            .with_context(|| format!("failed to create {}", output_path.display()))?,
    );
    for filename in &report.degenerate {
        writeln!(writer, "{}", filename)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
    }
    Ok(output_path)
}
