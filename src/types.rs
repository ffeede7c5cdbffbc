use serde::Serialize;
use std::fmt;

/// The single image encoding every retained image uses after normalization.
pub const CANONICAL_EXT: &str = "jpg";

/// Secondary spelling of the canonical format, renamed in place.
pub const ALTERNATE_EXT: &str = "jpeg";

/// Non-canonical encoding that gets re-encoded as JPEG.
pub const CONVERT_EXT: &str = "png";

/// Extension of the per-image annotation documents.
pub const ANNOTATION_EXT: &str = "xml";

/// Name of the audit output file, written under the dataset root.
pub const ERROR_FILE_NAME: &str = "error_files.txt";

// Which half of the partition a pair landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "Train"),
            Split::Validation => write!(f, "Validation"),
        }
    }
}

/// An image file and its same-stem annotation file within one subcategory
/// directory. Both fields are bare file names, not paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub image: String,
    pub annotation: String,
}

/// One manifest line, written after partitioning.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestRow {
    #[serde(rename = "File Type")]
    pub split: Split,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Subcategory")]
    pub subcategory: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Annotation")]
    pub annotation: String,
}

impl Serialize for Split {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Split::Train => "Train",
            Split::Validation => "Validation",
        })
    }
}
