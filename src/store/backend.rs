//! Storage backends for the local persistent store.
//!
//! A backend is a flat key-value map of named regions to raw JSON strings.
//! The file backend keeps one file per region under the data directory;
//! the memory backend exists so the engine can be tested without touching
//! the filesystem.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::Result;

/// File mode for regions that hold secrets (owner read/write only).
#[cfg(unix)]
pub const SECRET_FILE_MODE: u32 = 0o600;

/// Raw region storage. Implementations must treat values as opaque strings;
/// all JSON handling lives in the [`Store`](super::Store) facade.
pub trait StoreBackend: Send {
    /// Read a region, `None` if it was never written.
    fn read(&self, key: &str) -> Option<String>;

    /// Write a region, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Write a region that contains secrets (restrictive permissions where
    /// the backend supports them).
    fn write_secret(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, value)
    }

    /// Remove a region. Removing a missing region is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Backend storing one `<key>.json` file per region.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl StoreBackend for FileBackend {
    fn read(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn write_secret(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(SECRET_FILE_MODE))?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryBackend {
    regions: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<String> {
        self.regions.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        if let Ok(mut regions) = self.regions.lock() {
            regions.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Ok(mut regions) = self.regions.lock() {
            regions.remove(key);
        }
        Ok(())
    }
}
