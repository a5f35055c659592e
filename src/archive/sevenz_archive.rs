use std::fs::File;
use std::io;

use anyhow::Context;
use sevenz_rust::{Password, SevenZReader};

use super::{ArchiveEntry, ArchiveReader};
use crate::core::Result;

/// 7z containers are solid: reading one entry decodes its whole folder, so lookups walk the
/// entries in storage order and stop at the first match. Every entry passed on the way has to be
/// read to its end, otherwise the next one starts in the middle of the folder stream.
pub(super) struct SevenZipReader {
    reader: SevenZReader<File>,
}

impl SevenZipReader {
    pub(super) fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        let reader =
            SevenZReader::new(file, len, Password::empty()).context("reading 7z header")?;
        Ok(Self { reader })
    }
}

impl ArchiveReader for SevenZipReader {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        Ok(self
            .reader
            .archive()
            .files
            .iter()
            .map(|entry| ArchiveEntry {
                key: entry.name().to_string(),
                is_dir: entry.is_directory(),
                modified: None,
            })
            .collect())
    }

    fn read_entry(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut found = None;
        self.reader
            .for_each_entries(|entry, data| {
                if entry.is_directory() {
                    return Ok(true);
                }
                if entry.name() != key {
                    io::copy(data, &mut io::sink())?;
                    return Ok(true);
                }
                let mut content = Vec::new();
                data.read_to_end(&mut content)?;
                found = Some(content);
                Ok(false)
            })
            .with_context(|| format!("decompressing {key}"))?;
        Ok(found)
    }
}
