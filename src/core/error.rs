use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while mounting sources or resolving virtual paths.
///
/// The first four variants are mount-time failures. They only ever affect a single configuration
/// line: the line is logged and skipped, the rest of the configuration is still mounted.
/// The remaining variants are runtime failures returned to the caller as is.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A mount line (or JSON entry) could not be parsed.
    #[error("cannot parse mount line `{line}`: {reason}")]
    ConfigParse { line: String, reason: String },

    /// The source exists but its extension is not a recognised archive format.
    #[error("archive format is not supported: {}", .0.display())]
    UnsupportedArchiveFormat(PathBuf),

    /// The source is neither an existing directory nor an existing archive.
    #[error("source not found: {0}")]
    MissingSource(String),

    /// The archive exists but could not be opened or listed.
    #[error("could not open archive {}", .path.display())]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The virtual path does not resolve to a readable node.
    #[error("no such virtual file: {0}")]
    NotFound(String),

    /// The parent directory has no backing real directory.
    #[error("virtual directory is not writable: {0}")]
    WriteTargetNotWritable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VfsError {
    pub(crate) fn config(line: impl Into<String>, reason: impl Into<String>) -> Self {
        VfsError::ConfigParse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for the failures that only cause a mount line to be skipped.
    pub fn is_mount_error(&self) -> bool {
        matches!(
            self,
            VfsError::ConfigParse { .. }
                | VfsError::UnsupportedArchiveFormat(_)
                | VfsError::MissingSource(_)
                | VfsError::ArchiveOpen { .. }
        )
    }
}

pub type VfsResult<T> = std::result::Result<T, VfsError>;
