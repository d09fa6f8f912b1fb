use std::path::Path;

use serde::Serialize;

use crate::error::PersistenceError;

/// Serialize `value` as pretty JSON and write it atomically:
/// a sibling `.tmp` file is written first and then renamed over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<usize, PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    tracing::trace!(path = %path.display(), bytes = bytes.len(), "file written");
    Ok(bytes.len())
}

/// Remove a file if it exists.
pub fn remove_if_exists(path: &Path) -> Result<bool, PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.json");
        let written = write_json_atomic(&path, &vec!["x", "y"]).unwrap();
        assert!(written > 0);
        assert!(path.exists());
        assert!(!dir.path().join("a").join("b.json.tmp").exists());

        let back: Vec<String> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, vec!["x", "y"]);
    }

    #[test]
    fn remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_if_exists(&dir.path().join("nope.json")).unwrap());
    }
}
