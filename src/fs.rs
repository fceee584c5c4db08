//! Filesystem capability and the opaque file handle the rest of the
//! driver addresses files by.
//!
//! Path virtualization (relative/absolute/standard-streams/temp files)
//! is out of scope; we only need the interface such a layer would
//! expose: equality, hashing, a basename, and a modification-time
//! query. [`FileId`] is the handle, interned from real paths by
//! [`FileTable`]; [`FileSystem`] is the injected capability so tests
//! never have to touch the real disk.

use crate::error::{Error, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

/// Identity of a file, stable for the lifetime of a single invocation.
/// Two `FileId`s are equal iff they were interned from the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileId(pub u32);

/// Interns [`Path`]s into stable [`FileId`]s.
#[derive(Debug, Default)]
pub struct FileTable {
    paths: Vec<PathBuf>,
    by_path: HashMap<PathBuf, FileId>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, path: impl Into<PathBuf>) -> FileId {
        let path = path.into();
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.clone());
        self.by_path.insert(path, id);
        id
    }

    pub fn path(&self, id: FileId) -> &Path {
        &self.paths[id.0 as usize]
    }

    pub fn lookup(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn basename(&self, id: FileId) -> &str {
        self.path(id).file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FileId> {
        (0..self.paths.len() as u32).map(FileId)
    }
}

/// A `(seconds, nanos)` timestamp, preserved as an integer pair rather
/// than a float so build-record round-trips stay bit-exact (§4.5/§4.6:
/// "never float-convert timestamps").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp { seconds: 0, nanos: 0 };

    pub fn from_system_time(time: std::time::SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp { seconds: d.as_secs() as i64, nanos: d.subsec_nanos() },
            Err(e) => {
                let d = e.duration();
                Timestamp { seconds: -(d.as_secs() as i64), nanos: d.subsec_nanos() }
            }
        }
    }

    pub fn as_duration_since_epoch(&self) -> Duration {
        Duration::new(self.seconds.max(0) as u64, self.nanos)
    }
}

/// The filesystem capability the core needs: existence, modification
/// time, and read/write of small files. Injected rather than called
/// directly so the scheduler and incremental-state logic can be
/// exercised without touching real disk.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn modified(&self, path: &Path) -> Result<Timestamp>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// The real filesystem, for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> Result<Timestamp> {
        let meta = std::fs::metadata(path).map_err(|e| Error::io(e, path))?;
        let modified = meta.modified().map_err(|e| Error::io(e, path))?;
        Ok(Timestamp::from_system_time(modified))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| Error::io(e, path))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| Error::io(e, path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
        }
        std::fs::write(path, contents).map_err(|e| Error::io(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_deduplicates() {
        let mut table = FileTable::new();
        let a = table.intern("src/A.swift");
        let b = table.intern("src/B.swift");
        let a_again = table.intern("src/A.swift");
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(table.basename(a), "A.swift");
        assert_eq!(table.len(), 2);
    }
}
