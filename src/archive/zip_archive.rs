use std::fs::File;
use std::io::Read;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use zip::ZipArchive;
use zip::result::ZipError;

use super::{ArchiveEntry, ArchiveReader};
use crate::core::Result;

pub(super) struct ZipReader {
    archive: ZipArchive<File>,
}

impl ZipReader {
    pub(super) fn new(file: File) -> Result<Self> {
        let archive = ZipArchive::new(file).context("reading zip central directory")?;
        Ok(Self { archive })
    }
}

impl ArchiveReader for ZipReader {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for idx in 0..self.archive.len() {
            let file = self.archive.by_index_raw(idx)?;
            entries.push(ArchiveEntry {
                key: file.name().to_string(),
                is_dir: file.is_dir(),
                modified: file.last_modified().and_then(to_utc),
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.archive.by_name(key) {
            Ok(mut file) => {
                let mut content = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut content)
                    .with_context(|| format!("decompressing {key}"))?;
                Ok(Some(content))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn modified(&mut self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.archive.by_name(key) {
            Ok(file) => Ok(file.last_modified().and_then(to_utc)),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Zip timestamps are local MS-DOS times without a zone; they are taken as UTC.
fn to_utc(time: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )
    .map(|naive| naive.and_utc())
}
