//! Read-only access to archive containers.
//!
//! Every supported format is wrapped behind the [`ArchiveReader`] trait, so the mount layer and
//! the handle pool never care which container they are talking to. Readers are sequential and
//! must not be shared between threads; see [`ArchiveHandlePool`].

mod pool;
#[cfg(feature = "rar")]
mod rar_archive;
mod sevenz_archive;
mod zip_archive;

use std::fs::File;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};

use crate::core::Result;

pub use pool::{ArchiveHandlePool, thread_key};

/// The container formats recognised by file extension (matched case-insensitively).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
    SevenZ,
}

impl ArchiveFormat {
    pub const EXTENSIONS: [&'static str; 3] = ["zip", "rar", "7z"];

    /// Detects the format from the extension of `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "rar" => Some(ArchiveFormat::Rar),
            "7z" => Some(ArchiveFormat::SevenZ),
            _ => None,
        }
    }
}

/// Returns true if `name` (a system path or an archive entry key) has a supported archive extension.
pub fn is_archive_supported<P: AsRef<Path>>(name: P) -> bool {
    ArchiveFormat::from_path(name).is_some()
}

/// One entry of an archive listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// The entry key exactly as stored in the container.
    pub key: String,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// An open, sequential reader over one archive container.
pub trait ArchiveReader: Send {
    /// Lists every entry of the container.
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>>;

    /// Decompresses the entry stored under `key`. Returns `Ok(None)` if there is no such entry.
    fn read_entry(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns the timestamp of the entry stored under `key`, if the container records one.
    fn modified(&mut self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.modified))
    }
}

/// Opens the archive at `path` for reading.
///
/// The container file is opened read-only. `std` opens files with shared read/write access on
/// every platform, so any number of independent readers can coexist on the same container.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn ArchiveReader>> {
    let path = path.as_ref();
    let format = ArchiveFormat::from_path(path)
        .ok_or_else(|| anyhow!("{} is not a supported archive", path.display()))?;

    match format {
        ArchiveFormat::Zip => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(zip_archive::ZipReader::new(file)?))
        }
        ArchiveFormat::SevenZ => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(sevenz_archive::SevenZipReader::new(file)?))
        }
        #[cfg(feature = "rar")]
        ArchiveFormat::Rar => Ok(Box::new(rar_archive::RarReader::new(path)?)),
        #[cfg(not(feature = "rar"))]
        ArchiveFormat::Rar => Err(anyhow!(
            "{}: rar support is not enabled in this build",
            path.display()
        )),
    }
}
