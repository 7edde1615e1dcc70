//! Single-file and batch extraction
//!
//! Batch extraction walks the catalog in name order. Per-entry failures that
//! leave the catalog trustworthy (missing entry or volume, checksum
//! mismatch, undecodable chunk, unsafe output path) are logged, recorded in
//! the [`ExtractReport`] and skipped. Anything else aborts the batch.

use crate::reader::EntryReader;
use crate::vfs::VirtualFileSystem;
use crate::{ErrorKind, Result, VfsError};
use evofs_formats::CatalogEntry;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Entry left out of a batch extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Entry name
    pub name: String,
    /// Failure class
    pub kind: ErrorKind,
    /// Error message
    pub reason: String,
}

/// Outcome of a batch extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Entries written in full
    pub extracted: usize,
    /// Bytes written across all extracted entries
    pub bytes_written: u64,
    /// Entries that failed and were skipped
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    /// Whether every entry was extracted
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Render the report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Map an entry name onto a relative path, rejecting anything that could
/// leave the output directory
pub fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.contains(':') {
        return None;
    }

    let mut path = PathBuf::new();
    for part in normalized.split('/').filter(|p| !p.is_empty()) {
        match Path::new(part).components().next() {
            Some(Component::Normal(_)) if part != "." && part != ".." => path.push(part),
            _ => return None,
        }
    }

    (!path.as_os_str().is_empty()).then_some(path)
}

impl VirtualFileSystem {
    /// Extract every entry into sinks produced by `factory`.
    ///
    /// `factory` is called once per entry, in name order, after the entry's
    /// volume has been opened and right before its bytes are streamed.
    pub fn extract_all<F, W>(&self, mut factory: F, verify: bool) -> Result<ExtractReport>
    where
        F: FnMut(&CatalogEntry) -> io::Result<W>,
        W: Write,
    {
        self.extract_batch(|entry, mut reader| {
            let mut sink = factory(entry)?;
            let written = reader.extract_to(&mut sink, verify)?;
            sink.flush()?;
            Ok(written)
        })
    }

    /// Extract every entry under `out_dir`, mirroring entry names as paths.
    ///
    /// Checksums are verified when the configuration asks for it. Entries
    /// whose names would escape `out_dir` are skipped. A skipped entry leaves
    /// no file behind.
    pub fn extract_all_to_directory<P: AsRef<Path>>(&self, out_dir: P) -> Result<ExtractReport> {
        let out_dir = out_dir.as_ref();
        let verify = self.config().verify_checksums;
        self.extract_batch(|entry, reader| {
            let relative = safe_relative_path(&entry.name)
                .ok_or_else(|| VfsError::UnsafePath(entry.name.clone()))?;
            write_entry(reader, &out_dir.join(relative), verify)
        })
    }

    /// Extract one entry to `out_dir`, returning the written path.
    ///
    /// Checksums are verified when the configuration asks for it. On failure
    /// nothing is left at the returned path.
    pub fn extract_file<P: AsRef<Path>>(&self, name: &str, out_dir: P) -> Result<PathBuf> {
        let relative =
            safe_relative_path(name).ok_or_else(|| VfsError::UnsafePath(name.to_string()))?;
        let reader = self.open_reader(name)?;

        let path = out_dir.as_ref().join(relative);
        write_entry(reader, &path, self.config().verify_checksums)?;
        Ok(path)
    }

    fn extract_batch<F>(&self, mut extract_one: F) -> Result<ExtractReport>
    where
        F: FnMut(&CatalogEntry, EntryReader) -> Result<u64>,
    {
        let catalog = self.catalog();
        let entries = catalog.entries();
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| entries[a].name.cmp(&entries[b].name));

        let mut report = ExtractReport::default();
        for index in order {
            let entry = &entries[index];
            let result = self.open_reader_at(index).and_then(|reader| extract_one(entry, reader));

            match result {
                Ok(written) => {
                    report.extracted += 1;
                    report.bytes_written += written;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping {}: {}", entry.name, e);
                    report.skipped.push(SkippedEntry {
                        name: entry.name.clone(),
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Extracted {} entries ({} bytes), skipped {}",
            report.extracted,
            report.bytes_written,
            report.skipped.len()
        );
        Ok(report)
    }
}

/// Output file written under a `.partial` name and moved into place only
/// once every byte has been written and verified
struct PartialOutput {
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    committed: bool,
}

impl PartialOutput {
    fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = partial_path(path);
        let writer = BufWriter::new(File::create(&temp_path)?);
        Ok(Self {
            temp_path,
            writer: Some(writer),
            committed: false,
        })
    }

    fn commit(mut self, path: &Path) -> io::Result<()> {
        // The handle is closed before the rename
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        fs::rename(&self.temp_path, path)?;
        self.committed = true;
        Ok(())
    }
}

impl Write for PartialOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("output already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.as_mut().map_or(Ok(()), Write::flush)
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        self.writer = None;
        if !self.committed
            && let Err(e) = fs::remove_file(&self.temp_path)
        {
            debug!("Could not remove {}: {}", self.temp_path.display(), e);
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_entry(mut reader: EntryReader, path: &Path, verify: bool) -> Result<u64> {
    let mut output = PartialOutput::create(path)?;
    let written = reader.extract_to(&mut output, verify)?;
    output.commit(path)?;
    Ok(written)
}
