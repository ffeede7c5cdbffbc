//! Format normalization: PNG→JPEG conversion and `.jpeg`→`.jpg` renames,
//! with the paired annotation rewritten so its `filename`/`path` references
//! stay consistent.
//!
//! Normalization is split into a pure planning pass over the tree and an
//! apply pass that executes the planned operations, so a dry run is just the
//! plan, and idempotence means an already-normalized tree plans to nothing.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::types::{ALTERNATE_EXT, ANNOTATION_EXT, CANONICAL_EXT, CONVERT_EXT};
use crate::utils::{has_extension, sibling_with_extension};
use crate::voc;

/// One planned mutation of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOp {
    /// Re-encode a PNG as JPEG under the same stem and retarget the paired
    /// annotation. The source file is kept unless configured otherwise.
    Convert {
        source: PathBuf,
        target: PathBuf,
        annotation: Option<PathBuf>,
    },
    /// Rename a `.jpeg` image to `.jpg`, retargeting and then renaming the
    /// paired annotation as well.
    Rename {
        source: PathBuf,
        target: PathBuf,
        annotation: Option<PathBuf>,
    },
}

impl fmt::Display for NormalizeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeOp::Convert { source, target, .. } => {
                write!(f, "convert {} -> {}", source.display(), target.display())
            }
            NormalizeOp::Rename { source, target, .. } => {
                write!(f, "rename {} -> {}", source.display(), target.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Delete the PNG source after a successful conversion.
    pub remove_sources: bool,
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub converted: usize,
    pub renamed: usize,
    /// Images normalized without a same-stem annotation to keep in sync.
    pub missing_annotations: usize,
}

/// Walk `root` and produce the operations that would normalize it.
///
/// A PNG whose `.jpg` sibling already exists is considered converted by an
/// earlier run and is not re-planned, so a normalized tree is a fixed point
/// even when sources are kept.
pub fn plan(root: &Path) -> Result<Vec<NormalizeOp>> {
    let mut ops = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();

        if has_extension(path, CONVERT_EXT) {
            let target = sibling_with_extension(path, CANONICAL_EXT);
            if target.exists() {
                continue;
            }
            ops.push(NormalizeOp::Convert {
                source: path.to_path_buf(),
                target,
                annotation: existing_annotation(path),
            });
        } else if has_extension(path, ALTERNATE_EXT) {
            ops.push(NormalizeOp::Rename {
                source: path.to_path_buf(),
                target: sibling_with_extension(path, CANONICAL_EXT),
                annotation: existing_annotation(path),
            });
        }
    }

    Ok(ops)
}

fn existing_annotation(image_path: &Path) -> Option<PathBuf> {
    let annotation = sibling_with_extension(image_path, ANNOTATION_EXT);
    if annotation.exists() {
        Some(annotation)
    } else {
        warn!(
            "image {} has no matching annotation file",
            image_path.display()
        );
        None
    }
}

/// Execute a plan. An I/O failure aborts the run with context; re-running
/// the planner afterwards picks up from the surviving tree state.
pub fn apply_plan(ops: &[NormalizeOp], options: NormalizeOptions) -> Result<NormalizeReport> {
    let mut report = NormalizeReport::default();

    for op in ops {
        match op {
            NormalizeOp::Convert {
                source,
                target,
                annotation,
            } => {
                convert_image(source, target)?;
                match annotation {
                    Some(annotation_path) => retarget_annotation(annotation_path, target)?,
                    None => report.missing_annotations += 1,
                }
                if options.remove_sources {
                    fs::remove_file(source)
                        .with_context(|| format!("failed to remove {}", source.display()))?;
                }
                info!("converted {} -> {}", source.display(), target.display());
                report.converted += 1;
            }
            NormalizeOp::Rename {
                source,
                target,
                annotation,
            } => {
                // Content references must be updated before any physical
                // rename, or the lookup by the old name fails.
                match annotation {
                    Some(annotation_path) => {
                        retarget_annotation(annotation_path, target)?;
                        rename_file(source, target)?;
                        let new_annotation = sibling_with_extension(target, ANNOTATION_EXT);
                        rename_file(annotation_path, &new_annotation)?;
                    }
                    None => {
                        rename_file(source, target)?;
                        report.missing_annotations += 1;
                    }
                }
                info!("renamed {} -> {}", source.display(), target.display());
                report.renamed += 1;
            }
        }
    }

    Ok(report)
}

/// Decode `source`, flatten to 3-channel RGB and save it as JPEG at `target`.
fn convert_image(source: &Path, target: &Path) -> Result<()> {
    let img = image::open(source)
        .with_context(|| format!("failed to decode image {}", source.display()))?;
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.save_with_format(target, image::ImageFormat::Jpeg)
        .with_context(|| format!("failed to save converted image {}", target.display()))
}

fn retarget_annotation(annotation_path: &Path, image_path: &Path) -> Result<()> {
    let mut annotation = voc::read_annotation(annotation_path)?;
    voc::retarget(&mut annotation, image_path)?;
    voc::write_annotation(annotation_path, &annotation)
}

fn rename_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .with_context(|| format!("failed to rename {} -> {}", from.display(), to.display()))
}
