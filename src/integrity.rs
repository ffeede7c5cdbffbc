//! Integrity checking of image files.
//!
//! Walks a tree and verifies that every file claiming the target extension
//! actually decodes as the expected encoded format. A bad file never aborts
//! the walk; it becomes an issue in the returned report.

use image::ImageFormat;
use log::warn;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::utils::has_extension;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// The file could not be read at all.
    Unreadable(String),
    /// The bytes are not a decodable image.
    Undecodable(String),
    /// The bytes decode, but as a different format than claimed.
    WrongFormat { found: String },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Unreadable(cause) => write!(f, "unreadable: {}", cause),
            IssueKind::Undecodable(cause) => write!(f, "not a valid image: {}", cause),
            IssueKind::WrongFormat { found } => write!(f, "unexpected format: {}", found),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
}

#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Files with the target extension that were examined.
    pub checked: usize,
    /// Files that failed, in walk order.
    pub issues: Vec<ImageIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Walk `root` and check every file with extension `ext` against
/// `expected`. Diagnostic output only; nothing is mutated and the function
/// itself never fails.
pub fn check_tree(root: &Path, ext: &str, expected: ImageFormat) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if !has_extension(path, ext) {
            continue;
        }
        report.checked += 1;
        if let Some(kind) = check_file(path, expected) {
            warn!("invalid image {}: {}", path.display(), kind);
            report.issues.push(ImageIssue {
                path: path.to_path_buf(),
                kind,
            });
        }
    }

    report
}

/// Check one file; `None` means it is a valid image of the expected format.
pub fn check_file(path: &Path, expected: ImageFormat) -> Option<IssueKind> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return Some(IssueKind::Unreadable(e.to_string())),
    };

    let format = match image::guess_format(&bytes) {
        Ok(format) => format,
        Err(e) => return Some(IssueKind::Undecodable(e.to_string())),
    };
    if format != expected {
        return Some(IssueKind::WrongFormat {
            found: format!("{:?}", format),
        });
    }

    // Header matched; make sure the whole image actually decodes.
    match image::load_from_memory_with_format(&bytes, format) {
        Ok(_) => None,
        Err(e) => Some(IssueKind::Undecodable(e.to_string())),
    }
}
