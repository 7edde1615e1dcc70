//! Configuration for opening an installation

use crate::{CATALOG_FILE, COMBINED_FILE, Result, VOLUME_STEM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for [`VirtualFileSystem`](crate::VirtualFileSystem)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Installation directory
    pub root: PathBuf,

    /// Catalog file name inside `root`
    pub catalog_name: String,

    /// Combined data file name of early installations
    pub combined_name: String,

    /// Volume file stem; volume `n` is `<stem><n:03>.dat`
    pub volume_stem: String,

    /// Verify content checksums in the convenience extraction helpers
    pub verify_checksums: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            catalog_name: CATALOG_FILE.to_string(),
            combined_name: COMBINED_FILE.to_string(),
            volume_stem: VOLUME_STEM.to_string(),
            verify_checksums: true,
        }
    }
}

impl VfsConfig {
    /// Create a configuration for the installation at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data).map_err(std::io::Error::from)?;
        Ok(config)
    }

    /// Set the installation directory
    #[must_use]
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    /// Set the catalog file name
    #[must_use]
    pub fn with_catalog_name(mut self, name: impl Into<String>) -> Self {
        self.catalog_name = name.into();
        self
    }

    /// Set the combined data file name
    #[must_use]
    pub fn with_combined_name(mut self, name: impl Into<String>) -> Self {
        self.combined_name = name.into();
        self
    }

    /// Set the volume file stem
    #[must_use]
    pub fn with_volume_stem(mut self, stem: impl Into<String>) -> Self {
        self.volume_stem = stem.into();
        self
    }

    /// Enable or disable checksum verification in the extraction helpers
    #[must_use]
    pub const fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Path of the catalog file
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(&self.catalog_name)
    }

    /// Path of the combined data file
    pub fn combined_path(&self) -> PathBuf {
        self.root.join(&self.combined_name)
    }

    /// Path of volume `index` in a split installation
    pub fn volume_path(&self, index: u16) -> PathBuf {
        self.root.join(format!("{}{:03}.dat", self.volume_stem, index))
    }
}
