use std::path::{Path, PathBuf};

use anyhow::Context;
use unrar::Archive;

use super::{ArchiveEntry, ArchiveReader};
use crate::core::Result;

/// The unrar library works on paths rather than open files, so the handle only remembers the
/// container and every call opens a fresh cursor over it.
pub(super) struct RarReader {
    path: PathBuf,
}

impl RarReader {
    pub(super) fn new(path: &Path) -> Result<Self> {
        Archive::new(path)
            .open_for_listing()
            .with_context(|| format!("reading rar header of {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

fn entry_key(filename: &Path) -> String {
    filename.to_string_lossy().replace('\\', "/")
}

impl ArchiveReader for RarReader {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        for header in Archive::new(&self.path).open_for_listing()? {
            let header = header?;
            entries.push(ArchiveEntry {
                key: entry_key(&header.filename),
                is_dir: header.is_directory(),
                modified: None,
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = Archive::new(&self.path).open_for_processing()?;
        while let Some(header) = archive.read_header()? {
            archive = if entry_key(&header.entry().filename) == key {
                let (content, _) = header.read()?;
                return Ok(Some(content));
            } else {
                header.skip()?
            };
        }
        Ok(None)
    }
}
