//! Keyed blob persistence for client-side state (history, settings).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use common::Error;
use dashmap::DashMap;

/// Whole-value storage under a fixed key.
pub trait BlobStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, Error>;
    fn write(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// One file per key inside a directory. Writes go through a temp file and a
/// rename so a crash never leaves a half-written blob.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Store(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!("read {key}: {e}"))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| Error::Store(format!("write {key}: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| Error::Store(format!("rename {key}: {e}")))
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("remove {key}: {e}"))),
        }
    }
}

/// In-memory store for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.blobs.get(key).map(|v| v.clone()))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        self.blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("nested")).unwrap();

        assert_eq!(store.read("kitewatch-history").unwrap(), None);
        store.write("kitewatch-history", "[1,2,3]").unwrap();
        assert_eq!(
            store.read("kitewatch-history").unwrap().as_deref(),
            Some("[1,2,3]")
        );

        store.remove("kitewatch-history").unwrap();
        store.remove("kitewatch-history").unwrap();
        assert_eq!(store.read("kitewatch-history").unwrap(), None);
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryBlobStore::new();
        store.write("k", "a").unwrap();
        store.write("k", "b").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("b"));
    }
}
