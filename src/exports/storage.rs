//! Filesystem helpers shared by the sink and the metadata store

use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

static EXPORT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid export name regex"));

/// Export names double as file names, so anything that could escape the
/// configured directories is rejected.
pub fn is_valid_export_name(name: &str) -> bool {
    name.len() <= 128 && EXPORT_NAME.is_match(name) && !name.contains("..")
}

/// Replace `path` with `contents` without ever exposing a truncated file.
///
/// The bytes go to a temp file in the same directory, are fsynced, then renamed
/// over the destination. Blocking; call from `spawn_blocking`.
pub fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
