//! End-to-end preparation: normalize the dataset tree, partition every
//! configured subcategory and write the manifest.

use anyhow::Result;
use log::{info, warn};
use std::path::Path;

use crate::config::PipelineConfig;
use crate::normalize::{self, NormalizeOptions, NormalizeReport};
use crate::partition::{
    collect_pairs, copy_split, manifest_rows, split_pairs, write_manifest, SplitPairs,
};
use crate::types::ManifestRow;
use crate::utils::create_progress_bar;

#[derive(Debug, Default)]
pub struct PrepareSummary {
    pub normalize: NormalizeReport,
    pub train_pairs: usize,
    pub val_pairs: usize,
    /// Subcategory directories named in the config but absent on disk.
    pub missing_subcategories: usize,
}

/// Run the full preparation pipeline described by `config`. Normalization
/// happens first so partitioning only ever sees canonical file names.
pub fn prepare(config: &PipelineConfig) -> Result<PrepareSummary> {
    let mut summary = PrepareSummary::default();

    info!("normalizing {}", config.dataset_root.display());
    let ops = normalize::plan(&config.dataset_root)?;
    summary.normalize = normalize::apply_plan(
        &ops,
        NormalizeOptions {
            remove_sources: config.remove_converted_sources,
        },
    )?;

    let mut rows: Vec<ManifestRow> = Vec::new();
    for group in &config.groups {
        for subcategory in &group.subcategories {
            let subcategory_dir = config
                .dataset_root
                .join(&group.category)
                .join(subcategory);
            if !subcategory_dir.is_dir() {
                warn!(
                    "subcategory directory {} does not exist, skipping",
                    subcategory_dir.display()
                );
                summary.missing_subcategories += 1;
                continue;
            }

            let pairs = collect_pairs(&subcategory_dir)?;
            let split = split_pairs(pairs, config.val_ratio, config.seed);
            info!(
                "{}/{}: {} train, {} val",
                group.category,
                subcategory,
                split.train.len(),
                split.val.len()
            );

            copy_pairs_with_progress(&split, &subcategory_dir, config)?;
            summary.train_pairs += split.train.len();
            summary.val_pairs += split.val.len();
            rows.extend(manifest_rows(&group.category, subcategory, &split));
        }
    }

    write_manifest(&config.manifest_path, &rows)?;
    info!(
        "wrote manifest {} ({} rows)",
        config.manifest_path.display(),
        rows.len()
    );

    Ok(summary)
}

fn copy_pairs_with_progress(
    split: &SplitPairs,
    source_dir: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let pb = create_progress_bar(split.len() as u64, "Copy");
    let result = copy_split(
        split,
        source_dir,
        &config.train_dir,
        &config.val_dir,
        Some(&pb),
    );
    pb.finish_and_clear();
    result
}
