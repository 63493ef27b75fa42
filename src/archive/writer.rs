use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::SimpleFileOptions;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive path has no parent directory: {0}")]
    NoParent(String),

    #[error("archive writer is already {0}")]
    Closed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Committed,
    Discarded,
}

impl WriterState {
    fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
        }
    }
}

/// In-memory builder of one chapter archive
///
/// Entries stay in memory until [`ArchiveWriter::commit`]; nothing is visible
/// at the destination before the final rename, and a discarded writer never
/// touches the filesystem.
#[derive(Debug)]
pub struct ArchiveWriter {
    entries: BTreeMap<String, Vec<u8>>,
    state: WriterState,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            state: WriterState::Open,
        }
    }

    /// Buffers one entry; a second write under the same name replaces the first
    pub fn write(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        self.ensure_open()?;
        self.entries.insert(name.to_string(), bytes);
        Ok(())
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Writes the archive to `path` in a single visible step
    ///
    /// The zip is assembled in memory, written to a temporary file in the
    /// destination directory, synced, then renamed over `path`. The series
    /// directory is created when missing.
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Size of the committed archive in bytes
    /// * `Err(ArchiveError)` - Nothing was written at `path`; the writer is discarded
    pub fn commit(&mut self, path: &Path) -> Result<u64, ArchiveError> {
        self.ensure_open()?;

        let result = self.write_to(path);
        self.entries.clear();
        self.state = if result.is_ok() {
            WriterState::Committed
        } else {
            WriterState::Discarded
        };
        result
    }

    /// Drops every buffered entry; calling it again is a no-op
    pub fn discard(&mut self) {
        if self.state == WriterState::Open {
            self.entries.clear();
            self.state = WriterState::Discarded;
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == WriterState::Open
    }

    fn ensure_open(&self) -> Result<(), ArchiveError> {
        match self.state {
            WriterState::Open => Ok(()),
            other => Err(ArchiveError::Closed(other.label())),
        }
    }

    fn write_to(&self, path: &Path) -> Result<u64, ArchiveError> {
        let bundle = self.build_zip()?;

        let dir = path
            .parent()
            .ok_or_else(|| ArchiveError::NoParent(path.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bundle)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(path).map_err(|e| ArchiveError::Io(e.error))?;

        Ok(bundle.len() as u64)
    }

    fn build_zip(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}
