//! Reading policy documents from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::SchemaError;

const POLICY_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Parses a YAML or JSON file into a JSON value. JSON is valid YAML, so a
/// single parser covers both.
pub fn read_document(path: &Path) -> Result<Value, SchemaError> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|e| SchemaError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn is_policy_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| POLICY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Expands the given paths into policy files. Directories are walked
/// recursively and filtered by extension; explicit files are kept as given.
/// The result is sorted and free of duplicates.
pub fn collect_policy_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, SchemaError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.map_err(|e| SchemaError::Io {
                    path: path.clone(),
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| {
                            std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                        }),
                })?;
                if entry.file_type().is_file() && is_policy_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(SchemaError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            });
        }
    }

    files.sort();
    files.dedup();
    debug!("collected {} policy files", files.len());
    Ok(files)
}
