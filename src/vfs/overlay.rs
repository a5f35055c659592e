//! The [`Vfs`] facade: lifecycle, queries, reading and writing.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use regex::Regex;
use serde::Deserialize;

use crate::archive::{ArchiveHandlePool, thread_key};
use crate::core::utils::{normalize_virtual_path, virtual_file_name, virtual_parent};
use crate::core::{VfsError, VfsResult};

use super::config::{self, EXECUTABLE_PATH, MSTS_BASE_PATH, MountRecord, MountSource};
use super::entry::NodeKind;
use super::mount::{Mounter, log_skipped};
use super::tree::VfsTree;

/// Runtime switches of a [`Vfs`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Trace every resolution (virtual path => source) at `info` level.
    pub access_logging: bool,
    /// Expand archives found while walking a mounted directory. When off they are mounted as
    /// plain files.
    pub auto_mount_archives: bool,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            access_logging: false,
            auto_mount_archives: true,
        }
    }
}

/// Depth of a listing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SearchOption {
    #[default]
    TopDirectoryOnly,
    AllDirectories,
}

/// A readable, seekable view of a virtual file.
///
/// Real files are read straight from disk. Archive entries are decompressed into a buffer owned
/// by the reader.
#[derive(Debug)]
pub enum VfsReader {
    File(File),
    Archive(Cursor<Vec<u8>>),
}

impl Read for VfsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            VfsReader::File(file) => file.read(buf),
            VfsReader::Archive(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for VfsReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            VfsReader::File(file) => file.seek(pos),
            VfsReader::Archive(cursor) => cursor.seek(pos),
        }
    }
}

/// Where the bytes of a resolved virtual file live.
enum ReadTarget {
    System(PathBuf),
    Archive { archive: PathBuf, key: String },
}

/// A virtual file system overlaying real directories and archive containers.
///
/// One `Vfs` is one overlay view. It is `Send + Sync` and meant to be shared (e.g. in an `Arc`)
/// by every consumer instead of living in a global. The tree is read-mostly: lookups take a
/// shared lock, mounting and file creation take the exclusive one.
///
/// ```no_run
/// use vfs_overlay::{SearchOption, Vfs, VfsOptions};
///
/// let vfs = Vfs::new(VfsOptions::default());
/// vfs.initialize("/games/msts", None);
/// for route in vfs.get_directories("/MSTS/ROUTES/", SearchOption::TopDirectoryOnly) {
///     println!("{route}");
/// }
/// let trk = vfs.read_to_string("/MSTS/ROUTES/USA1/usa1.trk")?;
/// # Ok::<(), vfs_overlay::VfsError>(())
/// ```
pub struct Vfs {
    tree: RwLock<VfsTree>,
    archives: ArchiveHandlePool,
    options: VfsOptions,
    access_logging: AtomicBool,
    initialized: AtomicBool,
    mount_log: Mutex<Vec<String>>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(VfsOptions::default())
    }
}

impl Vfs {
    /// Creates an empty, uninitialized overlay.
    pub fn new(options: VfsOptions) -> Self {
        Self {
            tree: RwLock::new(VfsTree::new()),
            archives: ArchiveHandlePool::new(),
            access_logging: AtomicBool::new(options.access_logging),
            initialized: AtomicBool::new(false),
            mount_log: Mutex::new(Vec::new()),
            options,
        }
    }

    pub fn options(&self) -> &VfsOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_access_logging(&self, enabled: bool) {
        self.access_logging.store(enabled, Ordering::Relaxed);
    }

    pub fn is_access_logging(&self) -> bool {
        self.access_logging.load(Ordering::Relaxed)
    }

    /// Shared access to the tree, for diagnostics.
    pub fn tree(&self) -> RwLockReadGuard<'_, VfsTree> {
        self.tree.read()
    }

    // ---- lifecycle ----

    /// Builds the overlay from scratch.
    ///
    /// `init_path` is either a directory, mounted wholesale at `/MSTS/`, or a mount table file
    /// (JSON for `.json`, text lines otherwise). When `executable_dir` is an existing directory it
    /// is mounted at `/EXECUTABLE/` first. Any previous tree and pooled archive handles are
    /// dropped.
    ///
    /// Returns false if the init path is missing or any source failed to mount. Failures never
    /// abort the initialization: everything that could be mounted is.
    pub fn initialize<P: AsRef<Path>>(&self, init_path: P, executable_dir: Option<&Path>) -> bool {
        self.reset(executable_dir);
        self.try_attach(init_path, MSTS_BASE_PATH)
    }

    /// Builds the overlay from scratch out of text mount lines.
    pub fn initialize_from_lines<'a, I>(&self, lines: I, executable_dir: Option<&Path>) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.reset(executable_dir);
        self.attach_all(config::parse_lines(lines))
    }

    fn reset(&self, executable_dir: Option<&Path>) {
        self.archives.clear();
        *self.tree.write() = VfsTree::new();
        self.initialized.store(true, Ordering::Release);

        if let Some(dir) = executable_dir.filter(|dir| dir.is_dir()) {
            let mut tree = self.tree.write();
            let mut log = self.mount_log.lock();
            let mut mounter = Mounter {
                tree: &mut tree,
                log: &mut log,
                auto_mount_archives: self.options.auto_mount_archives,
            };
            if let Err(e) = mounter.mount_directory(dir, EXECUTABLE_PATH) {
                log_skipped(mounter.log, &e);
            }
        }
    }

    /// Attaches more sources to the existing tree without resetting it.
    ///
    /// A directory `init_path` is mounted at `base_path`; a file is read as a mount table.
    pub fn try_attach<P: AsRef<Path>>(&self, init_path: P, base_path: &str) -> bool {
        let init_path = init_path.as_ref();
        if init_path.is_dir() {
            let source = format!("{}/", init_path.display());
            return self.attach_all(vec![Ok(MountRecord::new(source, base_path))]);
        }

        let table = if init_path.is_file() {
            config::load_table(init_path)
        } else {
            Err(VfsError::MissingSource(init_path.display().to_string()))
        };
        match table {
            Ok(records) => self.attach_all(records),
            Err(e) => {
                let message = format!("VFS: Could not attach {}, aborting: {}", init_path.display(), e);
                tracing::error!("{}", message);
                self.mount_log.lock().push(message);
                false
            }
        }
    }

    fn attach_all(&self, records: Vec<VfsResult<MountRecord>>) -> bool {
        let mut success = true;
        for record in records {
            if let Err(e) = record.and_then(|record| self.mount(&record)) {
                log_skipped(&mut self.mount_log.lock(), &e);
                success = false;
            }
        }
        success
    }

    /// Mounts `source` at `mount_point`, returning the failure instead of only logging it.
    pub fn attach(&self, source: &str, mount_point: &str) -> VfsResult<()> {
        let record = MountRecord::new(source, mount_point);
        record.validate(&format!("{source} {mount_point}"))?;
        self.mount(&record)
    }

    fn mount(&self, record: &MountRecord) -> VfsResult<()> {
        let source = record.classify()?;
        let mount_point = record.virtual_mount_point();

        let mut tree = self.tree.write();
        let mut log = self.mount_log.lock();
        let mut mounter = Mounter {
            tree: &mut tree,
            log: &mut log,
            auto_mount_archives: self.options.auto_mount_archives,
        };
        match source {
            MountSource::Directory(directory) => {
                mounter.mount_directory(Path::new(&directory), &mount_point)?;
            }
            MountSource::Archive { archive, sub_path } => {
                let root = mounter.tree.root();
                let node = mounter
                    .tree
                    .change_directory(root, &mount_point, true)
                    .ok_or_else(|| VfsError::NotFound(mount_point.clone()))?;
                mounter.mount_archive(&archive, sub_path.as_deref(), node)?;
            }
        }
        Ok(())
    }

    /// Drops the tree and closes every pooled archive handle.
    pub fn shutdown(&self) {
        self.archives.clear();
        *self.tree.write() = VfsTree::new();
        self.initialized.store(false, Ordering::Release);
        tracing::info!("VFS shut down");
    }

    /// Closes the archive handles opened by the calling thread. Returns how many were closed.
    pub fn release_thread_archives(&self) -> usize {
        self.archives.release_thread(&thread_key())
    }

    /// Closes the handles every thread holds on `archive`, e.g. before the container is replaced.
    pub fn release_archive<P: AsRef<Path>>(&self, archive: P) -> usize {
        self.archives.close_archive(archive.as_ref())
    }

    /// Drains the queued mount-time messages.
    pub fn take_mount_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.mount_log.lock())
    }

    /// Writes the whole hierarchy to the log.
    pub fn debug_dump(&self) {
        tracing::info!("VFS: Start of hierarchy dump");
        for line in self.tree.read().dump() {
            tracing::info!("VFS: {}", line);
        }
        tracing::info!("VFS: End of hierarchy dump");
    }

    // ---- queries ----

    pub fn directory_exists(&self, vfs_path: &str) -> bool {
        let path = normalize_virtual_path(vfs_path);
        path.starts_with('/') && self.tree.read().directory_exists(&path)
    }

    pub fn file_exists(&self, vfs_path: &str) -> bool {
        let path = normalize_virtual_path(vfs_path);
        path.starts_with('/') && self.tree.read().file_exists(&path)
    }

    /// Lists the directories below `vfs_path`. A missing directory lists as empty.
    pub fn get_directories(&self, vfs_path: &str, search: SearchOption) -> Vec<String> {
        self.list(vfs_path, search, false, |_| true)
    }

    /// Lists the files below `vfs_path` whose name matches the glob `pattern`
    /// (`*` any run of characters, `?` a single one, case-insensitive).
    pub fn get_files(&self, vfs_path: &str, pattern: &str, search: SearchOption) -> Vec<String> {
        let Some(glob) = glob_regex(pattern) else {
            tracing::warn!(pattern, "Invalid search pattern");
            return Vec::new();
        };
        self.list(vfs_path, search, true, |name| glob.is_match(name))
    }

    fn list<F: Fn(&str) -> bool>(
        &self,
        vfs_path: &str,
        search: SearchOption,
        files: bool,
        accept: F,
    ) -> Vec<String> {
        let path = normalize_virtual_path(vfs_path);
        let tree = self.tree.read();
        let Some(dir) = tree.find_directory(tree.root(), &path) else {
            return Vec::new();
        };
        let recursive = search == SearchOption::AllDirectories;
        let mut result: Vec<String> = tree
            .entries(dir, recursive, files)
            .into_iter()
            .filter(|&id| accept(tree.node(id).name()))
            .map(|id| tree.vfs_path(id))
            .collect();
        result.sort();
        result
    }

    // ---- reading ----

    fn access(&self, message: std::fmt::Arguments<'_>) {
        if self.is_access_logging() {
            tracing::info!("{}", message);
        }
    }

    fn prepare_for_read(&self, vfs_path: &str) -> VfsResult<ReadTarget> {
        let path = normalize_virtual_path(vfs_path);
        let kind = {
            let tree = self.tree.read();
            tree.get_node(tree.root(), &path)
                .map(|id| tree.node(id).kind().clone())
        };

        match kind {
            Some(NodeKind::ArchiveFile {
                archive_path,
                sub_path,
            }) if archive_path.is_file() => {
                self.access(format_args!(
                    "VFS reading archive node: [{}]/{} => {}",
                    archive_path.display(),
                    sub_path,
                    path
                ));
                Ok(ReadTarget::Archive {
                    archive: archive_path,
                    key: sub_path,
                })
            }
            Some(NodeKind::File { absolute_path }) if absolute_path.is_file() => {
                self.access(format_args!(
                    "VFS reading system file: {} => {}",
                    absolute_path.display(),
                    path
                ));
                Ok(ReadTarget::System(absolute_path))
            }
            _ => {
                self.access(format_args!("VFS reading failed: null => {}", path));
                Err(VfsError::NotFound(vfs_path.to_string()))
            }
        }
    }

    fn read_archive_entry(&self, archive: &Path, key: &str, vfs_path: &str) -> VfsResult<Vec<u8>> {
        let to_error = |source| VfsError::ArchiveOpen {
            path: archive.to_path_buf(),
            source,
        };
        let handle = self
            .archives
            .get_or_open(&thread_key(), archive)
            .map_err(to_error)?;
        let content = handle.lock().read_entry(key).map_err(to_error)?;
        // the node exists but the container changed under it
        content.ok_or_else(|| VfsError::NotFound(vfs_path.to_string()))
    }

    /// Opens a virtual file for reading.
    pub fn open_read(&self, vfs_path: &str) -> VfsResult<VfsReader> {
        match self.prepare_for_read(vfs_path)? {
            ReadTarget::System(path) => Ok(VfsReader::File(File::open(path)?)),
            ReadTarget::Archive { archive, key } => {
                let content = self.read_archive_entry(&archive, &key, vfs_path)?;
                Ok(VfsReader::Archive(Cursor::new(content)))
            }
        }
    }

    /// Reads the whole content of a virtual file.
    pub fn read(&self, vfs_path: &str) -> VfsResult<Vec<u8>> {
        match self.prepare_for_read(vfs_path)? {
            ReadTarget::System(path) => Ok(std::fs::read(path)?),
            ReadTarget::Archive { archive, key } => self.read_archive_entry(&archive, &key, vfs_path),
        }
    }

    /// Reads a virtual file as UTF-8 text, skipping a byte order mark.
    pub fn read_to_string(&self, vfs_path: &str) -> VfsResult<String> {
        let mut content = self.read(vfs_path)?;
        if content.starts_with(&[0xEF, 0xBB, 0xBF]) {
            content.drain(..3);
        }
        String::from_utf8(content)
            .map_err(|e| VfsError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Last modification time of a virtual file.
    ///
    /// Archive entries report their own timestamp; when the format records none, the time of the
    /// container is used.
    pub fn last_write_time(&self, vfs_path: &str) -> VfsResult<DateTime<Utc>> {
        let path = match self.prepare_for_read(vfs_path)? {
            ReadTarget::System(path) => path,
            ReadTarget::Archive { archive, key } => {
                let handle = self
                    .archives
                    .get_or_open(&thread_key(), &archive)
                    .map_err(|source| VfsError::ArchiveOpen {
                        path: archive.clone(),
                        source,
                    })?;
                let modified = handle.lock().modified(&key).map_err(|source| VfsError::ArchiveOpen {
                    path: archive.clone(),
                    source,
                })?;
                match modified {
                    Some(time) => return Ok(time),
                    None => archive,
                }
            }
        };
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// The real path of a virtual file, or `None` if its bytes live inside an archive.
    pub fn system_path(&self, vfs_path: &str) -> VfsResult<Option<PathBuf>> {
        match self.prepare_for_read(vfs_path)? {
            ReadTarget::System(path) => Ok(Some(path)),
            ReadTarget::Archive { .. } => Ok(None),
        }
    }

    // ---- writing ----

    /// Creates (or truncates) a virtual file and opens it for writing.
    ///
    /// An existing regular file is truncated in place. Otherwise the parent directory must be
    /// backed by a real directory: the real file is created there first, the node is only
    /// registered once that succeeded.
    pub fn open_create(&self, vfs_path: &str) -> VfsResult<File> {
        let path = normalize_virtual_path(vfs_path);
        let mut tree = self.tree.write();
        let root = tree.root();

        if let Some(id) = tree.get_node(root, &path) {
            match tree.node(id).kind() {
                NodeKind::File { absolute_path } if absolute_path.is_file() => {
                    self.access(format_args!(
                        "VFS writing system file: {} => {}",
                        absolute_path.display(),
                        path
                    ));
                    return Ok(File::create(absolute_path)?);
                }
                NodeKind::Directory { .. } if !virtual_file_name(&path).is_empty() => {
                    self.access(format_args!("VFS writing failed: directory => {}", path));
                    return Err(VfsError::WriteTargetNotWritable(vfs_path.to_string()));
                }
                _ => {}
            }
        }

        let file_name = virtual_file_name(&path);
        let parent = tree
            .find_directory(root, virtual_parent(&path))
            .filter(|_| !file_name.is_empty());
        let Some(parent) = parent else {
            self.access(format_args!("VFS writing failed: null => {}", path));
            return Err(VfsError::NotFound(vfs_path.to_string()));
        };
        let directory = match tree.node(parent).kind() {
            NodeKind::Directory {
                absolute_path: Some(directory),
            } => directory.clone(),
            _ => {
                self.access(format_args!("VFS writing failed: null => {}", path));
                return Err(VfsError::WriteTargetNotWritable(vfs_path.to_string()));
            }
        };

        let real_path = directory.join(real_file_name(vfs_path, file_name));
        let file = File::create(&real_path)?;
        tree.create_file(parent, file_name, real_path.clone());
        self.access(format_args!(
            "VFS writing system file: {} => {}",
            real_path.display(),
            path
        ));
        Ok(file)
    }

    /// Deletes a regular file, both its node and the real file behind it. The node stays when
    /// the real file cannot be removed.
    pub fn file_delete(&self, vfs_path: &str) -> VfsResult<()> {
        let path = normalize_virtual_path(vfs_path);
        let mut tree = self.tree.write();
        let root = tree.root();

        let Some(id) = tree.get_node(root, &path) else {
            return Err(VfsError::NotFound(vfs_path.to_string()));
        };
        let NodeKind::File { absolute_path } = tree.node(id).kind().clone() else {
            return Err(VfsError::NotFound(vfs_path.to_string()));
        };

        match std::fs::remove_file(&absolute_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tree.delete_node(id);
        self.access(format_args!(
            "VFS deleting system file: {} => {}",
            absolute_path.display(),
            path
        ));
        Ok(())
    }
}

/// The name a new real file gets: as the caller spelled it, unless that spelling does not
/// normalize to the virtual name.
fn real_file_name<'a>(vfs_path: &'a str, virtual_name: &'a str) -> &'a str {
    let spelled = vfs_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim_matches('"');
    if spelled.to_uppercase() == virtual_name {
        spelled
    } else {
        virtual_name
    }
}

/// Turns a file name glob into an anchored regex over upper-cased names.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let pattern = pattern.trim().trim_matches('"').to_uppercase();
    let escaped = regex::escape(&pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}
