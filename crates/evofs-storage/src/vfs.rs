//! Installation facade
//!
//! Loads the catalog on open and opens volumes lazily, one slot per volume
//! index. A slot is `Unopened` until first use, then `Open` or `Missing`;
//! a missing volume is remembered so later lookups fail fast.

use crate::config::VfsConfig;
use crate::reader::EntryReader;
use crate::volume::Volume;
use crate::{Result, VfsError};
use evofs_formats::{Catalog, CatalogEntry, VolumeHeader};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Separate catalog plus numbered volumes
    Split,
    /// Early single data file with an embedded catalog
    Combined,
}

/// Observable state of a volume slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    /// Not requested yet
    Unopened,
    /// Opened and cached
    Open,
    /// File was not found on disk
    Missing,
}

#[derive(Debug)]
enum VolumeSlot {
    Unopened,
    Open(Arc<Volume>),
    Missing,
}

/// Read-only view of an installation
#[derive(Debug)]
pub struct VirtualFileSystem {
    config: VfsConfig,
    layout: Layout,
    catalog: Arc<Catalog>,
    volumes: Mutex<Vec<VolumeSlot>>,
}

impl VirtualFileSystem {
    /// Open the installation in `root` with default file names
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with_config(VfsConfig::new(root))
    }

    /// Open an installation described by `config`.
    ///
    /// A separate catalog takes precedence; without one, the combined data
    /// file's embedded catalog is used. No volume is opened here.
    pub fn open_with_config(config: VfsConfig) -> Result<Self> {
        let catalog_path = config.catalog_path();
        let combined_path = config.combined_path();

        let (layout, catalog) = if catalog_path.is_file() {
            let mut reader = BufReader::new(File::open(&catalog_path)?);
            (Layout::Split, Catalog::read(&mut reader)?)
        } else if combined_path.is_file() {
            let mut reader = BufReader::new(File::open(&combined_path)?);
            let header = VolumeHeader::read(&mut reader)?;
            reader.seek(SeekFrom::Start(header.toc_offset))?;
            (Layout::Combined, Catalog::read(&mut reader)?)
        } else {
            return Err(VfsError::CatalogNotFound(config.root.clone()));
        };

        let slot_count = match layout {
            Layout::Split => catalog.header().volume_count as usize,
            Layout::Combined => 1,
        };

        info!(
            "Opened {:?} installation at {}: {} entries, {} volumes",
            layout,
            config.root.display(),
            catalog.len(),
            slot_count
        );

        Ok(Self {
            config,
            layout,
            catalog: Arc::new(catalog),
            volumes: Mutex::new((0..slot_count).map(|_| VolumeSlot::Unopened).collect()),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Installation layout
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Loaded catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of volume slots
    pub fn volume_count(&self) -> usize {
        self.volumes.lock().len()
    }

    /// Path of volume `index`
    pub fn volume_path(&self, index: u16) -> PathBuf {
        match self.layout {
            Layout::Split => self.config.volume_path(index),
            Layout::Combined => self.config.combined_path(),
        }
    }

    /// State of volume slot `index`, `None` beyond the slot table
    pub fn volume_state(&self, index: u16) -> Option<VolumeState> {
        self.volumes
            .lock()
            .get(usize::from(index))
            .map(|slot| match slot {
                VolumeSlot::Unopened => VolumeState::Unopened,
                VolumeSlot::Open(_) => VolumeState::Open,
                VolumeSlot::Missing => VolumeState::Missing,
            })
    }

    /// Get volume `index`, opening it on first use
    pub fn volume(&self, index: u16) -> Result<Arc<Volume>> {
        let path = self.volume_path(index);
        let mut slots = self.volumes.lock();

        let Some(slot) = slots.get_mut(usize::from(index)) else {
            return Err(VfsError::VolumeNotFound { index, path });
        };

        match slot {
            VolumeSlot::Open(volume) => return Ok(Arc::clone(volume)),
            VolumeSlot::Missing => return Err(VfsError::VolumeNotFound { index, path }),
            VolumeSlot::Unopened => {}
        }

        if !path.is_file() {
            warn!("Volume {} missing: {}", index, path.display());
            *slot = VolumeSlot::Missing;
            return Err(VfsError::VolumeNotFound { index, path });
        }

        let header = self.catalog.header();
        let volume = Arc::new(Volume::open(&path, index, header.version, header.chunk_size)?);
        debug!("Cached volume {}", index);
        *slot = VolumeSlot::Open(Arc::clone(&volume));
        Ok(volume)
    }

    /// Look up the entry for a logical name
    pub fn resolve(&self, name: &str) -> Result<&CatalogEntry> {
        self.catalog
            .find_by_name(name)
            .ok_or_else(|| VfsError::EntryNotFound(name.to_string()))
    }

    /// Open a reader for a logical name
    pub fn open_reader(&self, name: &str) -> Result<EntryReader> {
        let index = self
            .catalog
            .find_index_by_name(name)
            .ok_or_else(|| VfsError::EntryNotFound(name.to_string()))?;
        self.open_reader_at(index)
    }

    /// Open a reader for the entry at a table index
    pub fn open_reader_at(&self, entry_index: usize) -> Result<EntryReader> {
        let entry = self
            .catalog
            .entry(entry_index)
            .ok_or_else(|| VfsError::EntryNotFound(format!("entry #{entry_index}")))?;
        let volume = self.volume(entry.volume_index)?;
        EntryReader::new(Arc::clone(&self.catalog), entry_index, volume)
    }

    /// All entries ordered by name
    pub fn list(&self) -> Vec<&CatalogEntry> {
        self.catalog.entries_sorted_by_name()
    }
}
