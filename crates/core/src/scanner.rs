use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Extensions picked up by the scan, matched exactly.
pub const PHOTO_EXTENSIONS: [&str; 2] = ["jpg", "JPG"];

/// List the photos directly inside `dir` (no recursion), sorted by path.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PHOTO_EXTENSIONS.contains(&e));
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
