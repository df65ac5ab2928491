//! # Upload Policy
//!
//! Pure decisions of the folder-sync pipeline: which files qualify for
//! upload, how an uploaded file is identified across engine restarts, and
//! what happens to the source file afterwards.
//!
//! The engine owns the filesystem; this module only answers questions
//! about paths, names and metadata it is handed.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "tiff", "tif"];

/// Maximum upload size in bytes (50 MB).
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Subdirectory uploaded files are moved into.
pub const UPLOADED_DIR_NAME: &str = "uploaded";

// =============================================================================
// Post-Upload Action
// =============================================================================

/// What happens to a source file after its upload succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    /// Move the file into the `uploaded/` subdirectory.
    #[default]
    Move,
    /// Delete the source file.
    Delete,
    /// Leave the file in place; the seen-set prevents re-upload.
    Keep,
}

impl std::fmt::Display for PostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostAction::Move => write!(f, "move"),
            PostAction::Delete => write!(f, "delete"),
            PostAction::Keep => write!(f, "keep"),
        }
    }
}

impl std::str::FromStr for PostAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "move" => Ok(PostAction::Move),
            "delete" => Ok(PostAction::Delete),
            "keep" => Ok(PostAction::Keep),
            other => Err(CoreError::InvalidFormat {
                field: "post_action".into(),
                reason: format!("'{}' is not one of: move, delete, keep", other),
            }),
        }
    }
}

// =============================================================================
// File Signature
// =============================================================================

/// Identity of an uploaded file across engine restarts.
///
/// Keyed by path + size + modification time: cheap to compute (no file
/// read) and invalidated exactly when the file's content plausibly
/// changed, at which point it should upload again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSignature {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileSignature {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        FileSignature {
            path: path.into(),
            size,
            modified,
        }
    }
}

// =============================================================================
// Upload Policy
// =============================================================================

/// Pure policy checks for upload candidates.
pub struct UploadPolicy;

impl UploadPolicy {
    /// True when the path carries an accepted extension.
    pub fn is_allowed_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Validates a candidate's size against the upload limit.
    pub fn check_size(path: &Path, size: u64) -> CoreResult<()> {
        if size > MAX_FILE_SIZE {
            return Err(CoreError::InvalidFormat {
                field: "file".into(),
                reason: format!(
                    "{} is {} MB, exceeding the {} MB upload limit",
                    path.display(),
                    size / 1024 / 1024,
                    MAX_FILE_SIZE / 1024 / 1024
                ),
            });
        }
        Ok(())
    }

    /// MIME type for an upload candidate, by extension.
    pub fn mime_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("pdf") => "application/pdf",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("tiff") | Some("tif") => "image/tiff",
            _ => "application/octet-stream",
        }
    }

    /// True when the path sits inside the `uploaded/` subdirectory and
    /// must be ignored by the watcher.
    pub fn is_in_uploaded_dir(path: &Path) -> bool {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            == Some(UPLOADED_DIR_NAME)
    }
}

// =============================================================================
// Collision-Free Naming
// =============================================================================

/// Picks a destination file name that does not collide with existing
/// entries, suffixing ` (n)` before the extension:
/// `scan.pdf` → `scan (1).pdf` → `scan (2).pdf` …
///
/// `exists` is a predicate over candidate names so this stays free of
/// filesystem access.
pub fn collision_free_name(file_name: &str, exists: impl Fn(&str) -> bool) -> String {
    if !exists(file_name) {
        return file_name.to_string();
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    for n in 1u32.. {
        let candidate = match ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        if !exists(&candidate) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_post_action_parse() {
        assert_eq!("move".parse::<PostAction>().unwrap(), PostAction::Move);
        assert_eq!("DELETE".parse::<PostAction>().unwrap(), PostAction::Delete);
        assert_eq!("keep".parse::<PostAction>().unwrap(), PostAction::Keep);
        assert!("shred".parse::<PostAction>().is_err());
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(UploadPolicy::is_allowed_extension(Path::new("scan.pdf")));
        assert!(UploadPolicy::is_allowed_extension(Path::new("scan.JPG")));
        assert!(!UploadPolicy::is_allowed_extension(Path::new("scan.exe")));
        assert!(!UploadPolicy::is_allowed_extension(Path::new("noext")));
    }

    #[test]
    fn test_size_limit() {
        let p = Path::new("big.pdf");
        assert!(UploadPolicy::check_size(p, MAX_FILE_SIZE).is_ok());
        assert!(UploadPolicy::check_size(p, MAX_FILE_SIZE + 1).is_err());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(UploadPolicy::mime_type(Path::new("a.pdf")), "application/pdf");
        assert_eq!(UploadPolicy::mime_type(Path::new("a.TIF")), "image/tiff");
        assert_eq!(
            UploadPolicy::mime_type(Path::new("a.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_uploaded_dir_detection() {
        assert!(UploadPolicy::is_in_uploaded_dir(Path::new(
            "/scans/uploaded/a.pdf"
        )));
        assert!(!UploadPolicy::is_in_uploaded_dir(Path::new("/scans/a.pdf")));
    }

    #[test]
    fn test_file_signature_changes_with_mtime() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(1);
        let a = FileSignature::new("/scans/a.pdf", 100, t0);
        let b = FileSignature::new("/scans/a.pdf", 100, t0);
        let c = FileSignature::new("/scans/a.pdf", 100, t1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_collision_free_name() {
        let taken = ["scan.pdf", "scan (1).pdf"];
        let exists = |name: &str| taken.contains(&name);
        assert_eq!(collision_free_name("other.pdf", exists), "other.pdf");
        assert_eq!(collision_free_name("scan.pdf", exists), "scan (2).pdf");
    }

    #[test]
    fn test_collision_free_name_without_extension() {
        let exists = |name: &str| name == "scan";
        assert_eq!(collision_free_name("scan", exists), "scan (1)");
    }
}
