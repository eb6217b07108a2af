//! Flat-file persistence for JSON documents.
//!
//! Reads reject corrupted payloads (NUL bytes, invalid UTF-8) before
//! parsing. Writes go to a temp file that is fsynced and renamed over the
//! target, so readers never observe a partial document.

use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from document reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    Missing(String),

    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    #[error("{path}: parse error: {message}")]
    Parse { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupted document: {0}")]
    Corrupt(String),
}

impl StoreError {
    fn io(path: &Path, error: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// Read a UTF-8 text file, rejecting NUL bytes.
pub fn read_text(path: impl AsRef<Path>) -> Result<String, StoreError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StoreError::Missing(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    if bytes.contains(&0) {
        return Err(StoreError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    String::from_utf8(bytes).map_err(|_| {
        StoreError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        ))
    })
}

/// Read and parse a JSON document.
pub fn read_json(path: impl AsRef<Path>) -> Result<Value, StoreError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| StoreError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Atomically write `value` as pretty JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), StoreError> {
    let mut rendered =
        serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    rendered.push('\n');
    write_text(path, &rendered)
}

/// Atomically replace `path` with `contents`.
///
/// The document is staged in a hidden sibling file, fsynced, renamed over
/// `path`, and then the directory entry is fsynced.
pub fn write_text(path: impl AsRef<Path>, contents: &str) -> Result<(), StoreError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let staged = staging_path(dir, path)?;
    if let Err(error) = stage(&staged, contents.as_bytes()) {
        let _ = fs::remove_file(&staged);
        return Err(error);
    }
    if let Err(e) = fs::rename(&staged, path) {
        let _ = fs::remove_file(&staged);
        return Err(StoreError::Io {
            path: path.display().to_string(),
            message: format!("rename {} -> {}: {e}", staged.display(), path.display()),
        });
    }
    sync_dir(dir)
}

/// `<dir>/.<name>.<pid>-<nanos>.partial`, on the same filesystem as the target.
fn staging_path(dir: &Path, path: &Path) -> Result<PathBuf, StoreError> {
    let name = path
        .file_name()
        .ok_or_else(|| StoreError::io(path, "path has no file name"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut staged = OsString::from(".");
    staged.push(name);
    staged.push(format!(".{}-{nanos}.partial", std::process::id()));
    Ok(dir.join(staged))
}

fn stage(staged: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(staged).map_err(|e| StoreError::io(staged, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(staged, e))?;
    file.sync_all().map_err(|e| StoreError::io(staged, e))
}

fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| StoreError::io(dir, e))
}
