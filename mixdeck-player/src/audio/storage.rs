//! Removable storage access
//!
//! The pipeline needs only sequential reads with seek on an opened file.
//! [`Storage`] is the seam to the mounted card; [`FsStorage`] implements it
//! on top of a directory (the card's mount point on the host).

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Readable, seekable byte source that can move to the producer thread
pub trait MediaSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaSource for T {}

/// Storage collaborator
///
/// `open` hands out an exclusively owned handle; dropping the handle closes it.
pub trait Storage: Send + Sync {
    /// Open a file for reading. Relative paths resolve against the storage root.
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>>;

    /// Names of the entries in the storage root (diagnostics only).
    fn list(&self) -> Result<Vec<String>>;
}

/// Storage backed by a mounted directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a path against the mount point
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Storage for FsStorage {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| Error::storage(&full, e))?;
        debug!(path = %full.display(), "Opened file");
        Ok(Box::new(BufReader::new(file)))
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| Error::storage(&self.root, e))?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }
}
