mod config;
mod entry;
mod mount;
mod overlay;
mod tree;

pub use config::{EXECUTABLE_PATH, MSTS_BASE_PATH, MountRecord, MountSource, OR_BASE_PATH};
pub use entry::{EntryType, NodeKind};
pub use overlay::{SearchOption, Vfs, VfsOptions, VfsReader};
pub use tree::{NodeId, VfsNode, VfsTree};
