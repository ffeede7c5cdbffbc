//! Train/validation partitioning of image–annotation pairs and the split
//! manifest.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use indicatif::ProgressBar;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

use crate::types::{ManifestRow, Pair, Split, ANNOTATION_EXT, CANONICAL_EXT};
use crate::utils::{ensure_directory, has_extension, sibling_with_extension};

/// The two halves of a partitioned subcategory.
#[derive(Debug, Default)]
pub struct SplitPairs {
    pub train: Vec<Pair>,
    pub val: Vec<Pair>,
}

impl SplitPairs {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.val.is_empty()
    }
}

/// Collect the canonical-format images in one subcategory directory that
/// have an existing same-stem annotation. Images without one are logged and
/// skipped. The result is sorted by image name so the later shuffle sees a
/// stable order regardless of directory iteration order.
pub fn collect_pairs(subcategory_dir: &Path) -> Result<Vec<Pair>> {
    let mut pairs = Vec::new();

    let entries = fs::read_dir(subcategory_dir)
        .with_context(|| format!("failed to list directory {}", subcategory_dir.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to list directory {}", subcategory_dir.display()))?;
        let path = entry.path();
        if !path.is_file() || !has_extension(&path, CANONICAL_EXT) {
            continue;
        }

        let annotation_path = sibling_with_extension(&path, ANNOTATION_EXT);
        if !annotation_path.exists() {
            warn!(
                "skipping {} as corresponding {} is missing",
                path.display(),
                annotation_path.display()
            );
            continue;
        }

        let image = file_name(&path)?;
        let annotation = file_name(&annotation_path)?;
        pairs.push(Pair { image, annotation });
    }

    pairs.sort_by(|a, b| a.image.cmp(&b.image));
    Ok(pairs)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .with_context(|| format!("path has no valid file name: {}", path.display()))
}

/// Shuffle with a seeded generator and split off `ceil(N * val_ratio)` pairs
/// for validation. The same seed over the same collected set yields an
/// identical split.
pub fn split_pairs(mut pairs: Vec<Pair>, val_ratio: f32, seed: u64) -> SplitPairs {
    let mut rng = StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);

    let val_len = (pairs.len() as f32 * val_ratio).ceil() as usize;
    let val = pairs.drain(0..val_len.min(pairs.len())).collect();

    SplitPairs { train: pairs, val }
}

/// Copy each pair's two files from `source_dir` into the train or validation
/// destination, creating destinations as needed. Collection already filtered
/// for existence, so a copy failure here is an error, never skipped.
pub fn copy_split(
    split: &SplitPairs,
    source_dir: &Path,
    train_dir: &Path,
    val_dir: &Path,
    progress: Option<&ProgressBar>,
) -> Result<()> {
    ensure_directory(train_dir)
        .with_context(|| format!("failed to create {}", train_dir.display()))?;
    ensure_directory(val_dir).with_context(|| format!("failed to create {}", val_dir.display()))?;

    for (pairs, destination) in [(&split.train, train_dir), (&split.val, val_dir)] {
        for pair in pairs.iter() {
            for name in [&pair.image, &pair.annotation] {
                let from = source_dir.join(name);
                let to = destination.join(name);
                fs::copy(&from, &to).with_context(|| {
                    format!("failed to copy {} -> {}", from.display(), to.display())
                })?;
            }
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }
    }

    Ok(())
}

/// Turn one subcategory's split into manifest rows, train rows first.
pub fn manifest_rows(category: &str, subcategory: &str, split: &SplitPairs) -> Vec<ManifestRow> {
    let row = |split_kind: Split, pair: &Pair| ManifestRow {
        split: split_kind,
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        image: pair.image.clone(),
        annotation: pair.annotation.clone(),
    };

    split
        .train
        .iter()
        .map(|pair| row(Split::Train, pair))
        .chain(split.val.iter().map(|pair| row(Split::Validation, pair)))
        .collect()
}

/// Write the manifest with its `File Type, Category, Subcategory, Image,
/// Annotation` header, one row per retained pair.
pub fn write_manifest(path: &Path, rows: &[ManifestRow]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create manifest {}", path.display()))?;
    writer
        .write_record(["File Type", "Category", "Subcategory", "Image", "Annotation"])
        .with_context(|| format!("failed to write manifest {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write manifest {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write manifest {}", path.display()))?;
    Ok(())
}
