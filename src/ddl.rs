//! Discovery of `.sql` scripts used to build a fresh database.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{DatabaseError, Result};

/// Recursively collect every `.sql` file under `dir`, sorted by path.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(DatabaseError::DdlNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(DatabaseError::DdlNotDirectory(dir.to_path_buf()));
    }

    let mut scripts = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && is_sql(entry.path()) {
            scripts.push(entry.into_path());
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Read one script into memory.
pub fn load(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| DatabaseError::io(path, e))
}

fn is_sql(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}
