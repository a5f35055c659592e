//! Per-thread cache of open archive readers.
//!
//! Archive readers keep a single internal cursor, so one reader can never serve two threads at
//! once. Instead of locking a shared reader, every thread gets its own reader per container,
//! registered under the composite key `"<thread>@<archive path>"`.
//!
//! Handles live until they are released explicitly: per thread with [`ArchiveHandlePool::release_thread`],
//! per container with [`ArchiveHandlePool::close_archive`], or all at once with
//! [`ArchiveHandlePool::clear`] (done by `Vfs::shutdown` and on re-initialization).

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::ArchiveReader;
use crate::core::Result;

/// A pooled reader. The mutex is only ever taken by the owning thread, so it never contends;
/// it exists to make the handle `Sync` for the pool.
pub type ArchiveHandle = Arc<Mutex<Box<dyn ArchiveReader>>>;

/// Identifies the calling thread: its name (if any) plus its unique id.
pub fn thread_key() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => format!("{}{:?}", name, current.id()),
        None => format!("{:?}", current.id()),
    }
}

#[derive(Default)]
pub struct ArchiveHandlePool {
    handles: DashMap<String, ArchiveHandle>,
}

impl ArchiveHandlePool {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(thread_key: &str, archive_path: &Path) -> String {
        format!("{}@{}", thread_key, archive_path.display())
    }

    /// Returns the reader of `thread_key` for `archive_path`, opening a fresh one on first use.
    pub fn get_or_open(&self, thread_key: &str, archive_path: &Path) -> Result<ArchiveHandle> {
        let key = Self::key(thread_key, archive_path);
        if let Some(handle) = self.handles.get(&key) {
            return Ok(Arc::clone(handle.value()));
        }

        // opened outside the map so a slow open never blocks other threads' lookups
        let reader = super::open(archive_path)?;
        tracing::debug!(key = %key, "Opened archive handle");

        let handle = self
            .handles
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(reader)));
        Ok(Arc::clone(handle.value()))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drops every handle opened by `thread_key`. Returns the number of released handles.
    pub fn release_thread(&self, thread_key: &str) -> usize {
        let prefix = format!("{thread_key}@");
        self.release_where(|key| key.starts_with(&prefix))
    }

    /// Drops the handles of every thread for `archive_path`.
    pub fn close_archive(&self, archive_path: &Path) -> usize {
        let suffix = format!("@{}", archive_path.display());
        self.release_where(|key| key.ends_with(&suffix))
    }

    pub fn clear(&self) {
        self.handles.clear();
    }

    fn release_where<F: Fn(&str) -> bool>(&self, matches: F) -> usize {
        let before = self.handles.len();
        self.handles.retain(|key, _| !matches(key));
        before - self.handles.len()
    }
}
