//! Small filesystem helpers shared by the file-backed stores.
//!
//! The `_async` variants run on tokio's blocking pool and are what the async
//! ports call.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Atomically replace `path` with `data`.
///
/// The bytes go to a tempfile in the same directory and are synced before the
/// rename, so readers observe either the old or the new file, never a torn one.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read `path` to a string, mapping a missing file to `None`.
pub fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn atomic_write_async(path: PathBuf, data: Vec<u8>) -> std::io::Result<()> {
    blocking(move || atomic_write(&path, &data)).await
}

pub async fn read_optional_async(path: PathBuf) -> std::io::Result<Option<String>> {
    blocking(move || read_optional(&path)).await
}

async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn read_optional_maps_missing_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
    }

    #[tokio::test]
    async fn async_variants_round_trip_through_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/cursor.json");

        assert!(read_optional_async(path.clone()).await.unwrap().is_none());
        atomic_write_async(path.clone(), b"{}".to_vec()).await.unwrap();
        assert_eq!(read_optional_async(path).await.unwrap().as_deref(), Some("{}"));
    }
}
