//! Dataset preparation pipeline for Pascal VOC object-detection training.
//!
//! This library keeps a `category/subcategory` tree of image + VOC XML
//! annotation pairs consistent before it is handed to a trainer: it can
//! verify that JPEG files really are JPEGs, flag annotations with degenerate
//! geometry, normalize PNG/`.jpeg` files to the canonical `.jpg` encoding
//! while keeping the paired annotations in sync, and split the resulting
//! pairs into train/validation sets with a manifest.

pub mod audit;
pub mod config;
pub mod integrity;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod train;
pub mod types;
pub mod utils;
pub mod voc;

// Re-export commonly used types and functions
pub use audit::{audit_tree, write_error_file, AuditReport};
pub use config::{CategoryGroup, PipelineConfig};
pub use integrity::{check_tree, ImageIssue, IntegrityReport, IssueKind};
pub use normalize::{apply_plan, plan, NormalizeOp, NormalizeOptions, NormalizeReport};
pub use partition::{collect_pairs, copy_split, split_pairs, write_manifest, SplitPairs};
pub use pipeline::{prepare, PrepareSummary};
pub use types::{ManifestRow, Pair, Split};
