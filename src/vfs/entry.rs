use std::path::{Path, PathBuf};

/// Coarse kind of a tree node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryType {
    Directory,
    File,
    ArchiveFile,
}

/// Where the bytes (or the writability) of a node come from.
///
/// Exactly one variant describes any node, so a leaf can never be half file, half archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A directory. With `absolute_path` set it mirrors that real directory and is writable,
    /// without it the directory is a pure namespace node.
    Directory { absolute_path: Option<PathBuf> },
    /// A regular file backed by a real file.
    File { absolute_path: PathBuf },
    /// A file whose bytes are the entry `sub_path` of the container at `archive_path`.
    ArchiveFile {
        archive_path: PathBuf,
        sub_path: String,
    },
}

impl NodeKind {
    pub fn directory(absolute_path: Option<PathBuf>) -> Self {
        NodeKind::Directory { absolute_path }
    }

    pub fn file<P: AsRef<Path>>(absolute_path: P) -> Self {
        NodeKind::File {
            absolute_path: absolute_path.as_ref().to_path_buf(),
        }
    }

    pub fn archive_file<P: AsRef<Path>>(archive_path: P, sub_path: impl Into<String>) -> Self {
        NodeKind::ArchiveFile {
            archive_path: archive_path.as_ref().to_path_buf(),
            sub_path: sub_path.into(),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            NodeKind::Directory { .. } => EntryType::Directory,
            NodeKind::File { .. } => EntryType::File,
            NodeKind::ArchiveFile { .. } => EntryType::ArchiveFile,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory { .. })
    }

    pub fn is_regular_file(&self) -> bool {
        matches!(self, NodeKind::File { .. })
    }

    pub fn is_archive_file(&self) -> bool {
        matches!(self, NodeKind::ArchiveFile { .. })
    }

    pub fn is_writable_dir(&self) -> bool {
        matches!(
            self,
            NodeKind::Directory {
                absolute_path: Some(_)
            }
        )
    }

    /// The real path behind the node: the mirrored directory, the file, or the container.
    pub fn absolute_path(&self) -> Option<&Path> {
        match self {
            NodeKind::Directory { absolute_path } => absolute_path.as_deref(),
            NodeKind::File { absolute_path } => Some(absolute_path),
            NodeKind::ArchiveFile { archive_path, .. } => Some(archive_path),
        }
    }

    /// Human readable source, e.g. `[/data/track.zip]/europe/rail.dat`, used in trace output.
    pub fn verbose_path(&self) -> String {
        match self {
            NodeKind::ArchiveFile {
                archive_path,
                sub_path,
            } => format!("[{}]/{}", archive_path.display(), sub_path),
            _ => self
                .absolute_path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "null".to_string()),
        }
    }
}
