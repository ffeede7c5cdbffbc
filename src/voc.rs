//! Reading, rewriting and saving Pascal VOC annotation documents.
//!
//! The model covers the full labelImg schema so that an in-place rewrite of
//! `filename`/`path` keeps every other element of the document intact.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A Pascal VOC annotation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "annotation")]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmented: Option<u32>,
    #[serde(default, rename = "object", skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<Object>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficult: Option<u32>,
    pub bndbox: BndBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BndBox {
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

/// Parse an annotation file.
pub fn read_annotation(path: &Path) -> Result<Annotation> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read annotation file {}", path.display()))?;
    quick_xml::de::from_str(&content)
        .with_context(|| format!("failed to parse annotation file {}", path.display()))
}

/// Persist an annotation document in place.
pub fn write_annotation(path: &Path, annotation: &Annotation) -> Result<()> {
    let content = quick_xml::se::to_string(annotation)
        .with_context(|| format!("failed to serialize annotation for {}", path.display()))?;
    fs::write(path, content)
        .with_context(|| format!("failed to write annotation file {}", path.display()))
}

/// Point an annotation's `filename`/`path` references at a new image file.
///
/// `image_path` does not need to exist yet; the absolute path is built from
/// the canonicalized parent directory, which must exist.
pub fn retarget(annotation: &mut Annotation, image_path: &Path) -> Result<()> {
    let basename = image_path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("image path has no file name: {}", image_path.display()))?;
    let parent = image_path.parent().unwrap_or_else(|| Path::new("."));
    let absolute = fs::canonicalize(parent)
        .with_context(|| format!("failed to resolve directory {}", parent.display()))?
        .join(basename);

    annotation.filename = basename.to_string();
    annotation.path = Some(absolute.to_string_lossy().into_owned());
    Ok(())
}
