use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One dataset category and the subcategory directories (class labels)
/// that live under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub subcategories: Vec<String>,
}

/// Explicit configuration for a preparation run, replacing the hardcoded
/// category maps and paths of earlier script versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the `category/subcategory` dataset tree.
    pub dataset_root: PathBuf,
    /// Destination for training pairs.
    pub train_dir: PathBuf,
    /// Destination for validation pairs.
    pub val_dir: PathBuf,
    /// Where the split manifest is written.
    pub manifest_path: PathBuf,
    /// Categories and their subcategories, in processing order.
    pub groups: Vec<CategoryGroup>,
    /// Proportion of each subcategory's pairs used for validation.
    pub val_ratio: f32,
    /// Seed for the shuffle that drives the split.
    pub seed: u64,
    /// Delete PNG sources after a successful JPEG conversion.
    pub remove_converted_sources: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("datasets"),
            train_dir: PathBuf::from("organized_data/train"),
            val_dir: PathBuf::from("organized_data/val"),
            manifest_path: PathBuf::from("datasets.csv"),
            groups: Vec::new(),
            val_ratio: 0.2,
            seed: 42,
            remove_converted_sources: false,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// The class label list handed to the trainer: every subcategory, in
    /// configuration order.
    pub fn labels(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| group.subcategories.iter().cloned())
            .collect()
    }
}

/// Dataset preparation pipeline for Pascal VOC object-detection training.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify that every image with the target extension really decodes as
    /// the expected format
    Check {
        /// Directory tree to scan
        #[arg(long = "root")]
        root: PathBuf,

        /// Extension the files claim
        #[arg(long = "ext", default_value = "jpg")]
        ext: String,
    },

    /// Flag annotations with degenerate geometry and write error_files.txt
    Audit {
        /// Dataset root to scan
        #[arg(long = "root")]
        root: PathBuf,
    },

    /// Convert PNG images to JPEG and rename .jpeg files to .jpg, keeping
    /// paired annotations in sync
    Normalize {
        /// Dataset root to normalize
        #[arg(long = "root")]
        root: PathBuf,

        /// Print the planned operations without applying them
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Delete PNG sources after a successful conversion
        #[arg(long = "remove-sources")]
        remove_sources: bool,
    },

    /// Normalize, split every subcategory into train/val and write a manifest
    Prepare {
        /// JSON configuration file; flags below override its values
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Dataset root, overriding the config file
        #[arg(long = "root")]
        root: Option<PathBuf>,

        /// Validation proportion of each subcategory
        #[arg(long = "val-ratio", value_parser = validate_ratio)]
        val_ratio: Option<f32>,

        /// Seed for the split shuffle
        #[arg(long = "seed")]
        seed: Option<u64>,

        /// Plan the normalization but copy nothing
        #[arg(long = "dry-run")]
        dry_run: bool,
    },

    /// Invoke the external trainer on a prepared dataset
    Train {
        /// External trainer executable
        #[arg(long = "program")]
        program: PathBuf,

        /// JSON configuration file naming the train/val dirs and labels
        #[arg(short = 'c', long = "config")]
        config: PathBuf,

        /// Images per training batch
        #[arg(long = "batch-size", default_value_t = 4)]
        batch_size: u32,

        /// Number of training epochs
        #[arg(long = "epochs", default_value_t = 20)]
        epochs: u32,

        /// Fine-tune the whole model instead of only the head
        #[arg(long = "train-whole-model")]
        train_whole_model: bool,

        /// Export the trained model to this file and re-evaluate it
        #[arg(long = "export")]
        export: Option<PathBuf>,
    },
}

// Validate that the ratio is between 0.0 and 1.0
pub fn validate_ratio(s: &str) -> Result<f32, String> {
    match f32::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("RATIO must be between 0.0 and 1.0".to_string()),
    }
}
