//! A union virtual file system for simulator content.
//! Overlays real directories and zip/rar/7z archives into a single case-insensitive tree.
//!
//! ### Overview
//!
//! Content for a simulator usually lives in several places: an install directory, routes unpacked
//! somewhere else, packs still zipped. `vfs-overlay` mounts them all below well-known prefixes
//! (`/MSTS/`, `/OR/`) so the rest of the program reads one virtual hierarchy and never cares where
//! a file really comes from.
//!
//! **Key ideas**:
//! - **Union semantics**: sources mounted later win for files, directories merge their children.
//! - **Case-insensitive paths**: `/MSTS/Routes/Foo.Pat` and `/msts/routes/foo.pat` are the same file.
//! - **Archives as directories**: entries of an archive appear as plain files and are decompressed
//!   on read, with one reader per thread and container.
//! - **Writes go to disk**: files can be created below any directory that mirrors a real one.
//!
//! ```no_run
//! use vfs_overlay::{Vfs, VfsOptions};
//!
//! let vfs = Vfs::new(VfsOptions::default());
//! if !vfs.initialize("vfs.cfg", None) {
//!     for message in vfs.take_mount_log() {
//!         eprintln!("{message}");
//!     }
//! }
//! assert!(vfs.directory_exists("/MSTS/ROUTES/"));
//! ```

mod archive;
mod core;
mod vfs;

pub use crate::archive::ArchiveFormat;
pub use crate::core::utils::{normalize_system_path, normalize_virtual_path};
pub use crate::core::{VfsError, VfsResult};
pub use crate::vfs::{
    EXECUTABLE_PATH, EntryType, MSTS_BASE_PATH, MountRecord, MountSource, NodeId, NodeKind,
    OR_BASE_PATH, SearchOption, Vfs, VfsNode, VfsOptions, VfsReader, VfsTree,
};
