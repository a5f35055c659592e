//! Populating the tree from real directories and archive containers.

use std::path::{Path, PathBuf};

use crate::archive::{self, is_archive_supported};
use crate::core::utils::{normalize_virtual_path, virtual_file_name, virtual_parent};
use crate::core::{VfsError, VfsResult};

use super::tree::{NodeId, VfsTree};

/// Mounts sources into a tree and records what it did in `log`.
pub(crate) struct Mounter<'a> {
    pub tree: &'a mut VfsTree,
    pub log: &'a mut Vec<String>,
    pub auto_mount_archives: bool,
}

impl Mounter<'_> {
    fn note(&mut self, message: String) {
        tracing::info!("{}", message);
        self.log.push(message);
    }

    /// Mirrors the real directory `directory` below the virtual directory `mount_point`.
    ///
    /// The walk uses an explicit stack rather than recursion, so deep trees cannot overflow.
    /// Archives met on the way are expanded into the directory that contains them: their
    /// entries show up there directly, the archive itself is not listed. A subdirectory or file
    /// that cannot be read is skipped with a warning.
    ///
    /// Symbolic links are followed, except a directory link that leads back to one of its own
    /// ancestors. That link is left out, so a looping tree is mounted once.
    pub fn mount_directory(&mut self, directory: &Path, mount_point: &str) -> VfsResult<usize> {
        let root = self.tree.root();
        let mount_node = self
            .tree
            .change_directory(root, mount_point, true)
            .ok_or_else(|| VfsError::NotFound(mount_point.to_string()))?;
        self.tree.set_backing(mount_node, directory.to_path_buf());

        self.note(format!(
            "VFS mount system directory: {} => {}",
            directory.display(),
            mount_point
        ));

        let mut mounted = 0;
        let ancestors: Vec<PathBuf> = std::fs::canonicalize(directory).into_iter().collect();
        let mut stack: Vec<(PathBuf, NodeId, Vec<PathBuf>)> =
            vec![(directory.to_path_buf(), mount_node, ancestors)];
        while let Some((dir_path, vfs_node, ancestors)) = stack.pop() {
            let read_dir = match std::fs::read_dir(&dir_path) {
                Ok(read_dir) => read_dir,
                Err(e) => {
                    tracing::warn!(path = %dir_path.display(), error = %e, "Cannot read directory, skipping");
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            let mut files = Vec::new();
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    subdirs.push(path);
                } else {
                    files.push(path);
                }
            }

            for subdir in subdirs {
                let real = match std::fs::canonicalize(&subdir) {
                    Ok(real) => real,
                    Err(e) => {
                        tracing::warn!(path = %subdir.display(), error = %e, "Cannot resolve directory, skipping");
                        continue;
                    }
                };
                if ancestors.contains(&real) {
                    tracing::warn!(path = %subdir.display(), target = %real.display(), "Directory loop, skipping");
                    continue;
                }
                let name = normalize_virtual_path(&entry_name(&subdir));
                let child = self.tree.create_directory(vfs_node, &name, Some(subdir.clone()));
                if self.tree.node(child).is_dir() {
                    let mut below = ancestors.clone();
                    below.push(real);
                    stack.push((subdir, child, below));
                }
            }

            for file in files {
                if self.auto_mount_archives && is_archive_supported(&file) {
                    // a broken archive only loses its own entries, the walk carries on
                    if let Err(e) = self.mount_archive(&file, None, vfs_node) {
                        self.warn(&e);
                    }
                    continue;
                }
                let name = normalize_virtual_path(&entry_name(&file));
                self.tree.create_file(vfs_node, &name, file);
                mounted += 1;
            }
        }
        Ok(mounted)
    }

    /// Mounts the entries of the container `archive_path` below `mount_node`.
    ///
    /// With `sub_path` set only the entries below that directory are taken, relative to it.
    /// The container is listed completely before the tree is touched, so an archive that fails
    /// to open or list adds nothing at all.
    pub fn mount_archive(
        &mut self,
        archive_path: &Path,
        sub_path: Option<&str>,
        mount_node: NodeId,
    ) -> VfsResult<usize> {
        let entries = archive::open(archive_path)
            .and_then(|mut reader| reader.entries())
            .map_err(|source| VfsError::ArchiveOpen {
                path: archive_path.to_path_buf(),
                source,
            })?;

        let mount_point = format!(
            "{}/",
            self.tree.vfs_path(mount_node).trim_end_matches('/')
        );
        self.note(format!(
            "VFS mount archive: [{}]/{} => {}",
            archive_path.display(),
            sub_path.unwrap_or_default(),
            mount_point
        ));

        let filter = sub_path.map(normalize_virtual_path);
        let mut mounted = 0;
        for entry in entries.into_iter().filter(|entry| !entry.is_dir) {
            let key = normalize_virtual_path(&entry.key);
            let relative = match &filter {
                None => key.as_str(),
                Some(prefix) if prefix.ends_with('/') && key.starts_with(prefix.as_str()) => {
                    &key[prefix.len()..]
                }
                Some(_) => continue,
            };

            if is_archive_supported(relative) {
                tracing::debug!(
                    archive = %archive_path.display(),
                    entry = %entry.key,
                    "Nested archives are not supported, mounting as a plain entry"
                );
            }

            let file_name = virtual_file_name(relative);
            if file_name.is_empty() {
                continue;
            }
            let Some(parent) = self
                .tree
                .change_directory(mount_node, virtual_parent(relative), true)
            else {
                tracing::debug!(entry = %entry.key, "Cannot place archive entry, skipping");
                continue;
            };
            self.tree.create_archive_file(
                parent,
                file_name,
                archive_path.to_path_buf(),
                entry.key.clone(),
            );
            mounted += 1;
        }
        Ok(mounted)
    }

    fn warn(&mut self, error: &VfsError) {
        log_skipped(self.log, error);
    }
}

/// Reports a mount failure that only costs the current source.
pub(crate) fn log_skipped(log: &mut Vec<String>, error: &VfsError) {
    let message = format!("VFS mount: {error}, skipping");
    match error {
        VfsError::ArchiveOpen { source, .. } => {
            tracing::warn!(error = %source, "{}", message)
        }
        _ => tracing::warn!("{}", message),
    }
    log.push(message);
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use crate::vfs::entry::NodeKind;
    use tempdir::TempDir;

    fn setup_test_env() -> TempDir {
        TempDir::new("mount_test").unwrap()
    }

    struct Fixture {
        tree: VfsTree,
        log: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: VfsTree::new(),
                log: Vec::new(),
            }
        }

        fn mounter(&mut self) -> Mounter<'_> {
            Mounter {
                tree: &mut self.tree,
                log: &mut self.log,
                auto_mount_archives: true,
            }
        }

        fn mount_dir(&mut self, dir: &Path, mount_point: &str) {
            self.mounter().mount_directory(dir, mount_point).unwrap();
        }

        fn mount_zip(&mut self, zip: &Path, sub_path: Option<&str>, mount_point: &str) -> VfsResult<usize> {
            let root = self.tree.root();
            let node = self.tree.change_directory(root, mount_point, true).unwrap();
            self.mounter().mount_archive(zip, sub_path, node)
        }

        fn kind(&self, path: &str) -> NodeKind {
            let id = self.tree.get_node(self.tree.root(), path).unwrap();
            self.tree.node(id).kind().clone()
        }
    }

    mod directories {
        use super::*;

        #[test]
        fn test_mount_directory_tree() {
            let temp_dir = setup_test_env();
            let root = temp_dir.path();
            std::fs::create_dir_all(root.join("routes/usa85")).unwrap();
            std::fs::write(root.join("routes/usa85/Track.tdb"), b"tdb").unwrap();
            std::fs::write(root.join("readme.txt"), b"hi").unwrap();

            let mut fixture = Fixture::new();
            fixture.mount_dir(root, "/MSTS/");

            assert!(fixture.tree.file_exists("/MSTS/README.TXT"));
            assert!(fixture.tree.file_exists("/MSTS/ROUTES/USA85/TRACK.TDB"));
            assert_eq!(
                fixture.kind("/MSTS/ROUTES/USA85/TRACK.TDB"),
                NodeKind::file(root.join("routes/usa85/Track.tdb"))
            );
            assert!(fixture.kind("/MSTS/ROUTES").is_writable_dir());
            assert!(fixture.kind("/MSTS").is_writable_dir());
            assert!(fixture.log[0].contains("VFS mount system directory"));
        }

        #[test]
        fn test_remount_keeps_children() {
            let temp_dir = setup_test_env();
            let a = temp_dir.path().join("a");
            let b = temp_dir.path().join("b");
            std::fs::create_dir_all(&a).unwrap();
            std::fs::create_dir_all(&b).unwrap();
            std::fs::write(a.join("only_a.txt"), b"a").unwrap();
            std::fs::write(a.join("f.txt"), b"from a").unwrap();
            std::fs::write(b.join("f.txt"), b"from b").unwrap();

            let mut fixture = Fixture::new();
            fixture.mount_dir(&a, "/MSTS/X/");
            fixture.mount_dir(&b, "/MSTS/X/");

            assert!(fixture.tree.file_exists("/MSTS/X/ONLY_A.TXT"));
            assert_eq!(fixture.kind("/MSTS/X/F.TXT"), NodeKind::file(b.join("f.txt")));
            assert_eq!(
                fixture.kind("/MSTS/X").absolute_path(),
                Some(b.as_path())
            );
        }

        #[test]
        fn test_archive_in_directory_is_expanded() {
            let temp_dir = setup_test_env();
            let routes = temp_dir.path().join("routes");
            std::fs::create_dir_all(&routes).unwrap();
            write_zip(&routes.join("track.zip"), &[("europe/rail.dat", b"rails")]);

            let mut fixture = Fixture::new();
            fixture.mount_dir(&routes, "/MSTS/ROUTES/");

            assert!(fixture.tree.file_exists("/MSTS/ROUTES/EUROPE/RAIL.DAT"));
            assert!(!fixture.tree.file_exists("/MSTS/ROUTES/TRACK.ZIP"));
            assert_eq!(
                fixture.kind("/MSTS/ROUTES/EUROPE/RAIL.DAT"),
                NodeKind::archive_file(routes.join("track.zip"), "europe/rail.dat")
            );
            // directories created for archive entries are not writable
            assert!(!fixture.kind("/MSTS/ROUTES/EUROPE").is_writable_dir());
        }

        #[test]
        fn test_archive_mounted_as_file_without_auto_mount() {
            let temp_dir = setup_test_env();
            write_zip(&temp_dir.path().join("track.zip"), &[("a.txt", b"a")]);

            let mut fixture = Fixture::new();
            let mut mounter = fixture.mounter();
            mounter.auto_mount_archives = false;
            mounter.mount_directory(temp_dir.path(), "/MSTS/").unwrap();

            assert!(fixture.tree.file_exists("/MSTS/TRACK.ZIP"));
            assert!(!fixture.tree.file_exists("/MSTS/A.TXT"));
        }

        #[cfg(unix)]
        #[test]
        fn test_directory_loops_are_cut() {
            use std::os::unix::fs::symlink;

            let temp_dir = setup_test_env();
            let root = temp_dir.path().join("content");
            std::fs::create_dir_all(root.join("routes/usa85")).unwrap();
            std::fs::write(root.join("routes/usa85/Track.tdb"), b"tdb").unwrap();
            symlink(&root, root.join("routes/back_to_root")).unwrap();
            symlink(root.join("routes"), root.join("routes/usa85/back_to_routes")).unwrap();
            std::fs::create_dir_all(temp_dir.path().join("shared")).unwrap();
            std::fs::write(temp_dir.path().join("shared/common.dat"), b"common").unwrap();
            symlink(temp_dir.path().join("shared"), root.join("shared")).unwrap();

            let mut fixture = Fixture::new();
            fixture.mount_dir(&root, "/MSTS/");

            assert!(fixture.tree.file_exists("/MSTS/ROUTES/USA85/TRACK.TDB"));
            assert!(!fixture.tree.directory_exists("/MSTS/ROUTES/BACK_TO_ROOT"));
            assert!(!fixture.tree.directory_exists("/MSTS/ROUTES/USA85/BACK_TO_ROUTES"));
            // links that do not loop are still followed
            assert!(fixture.tree.file_exists("/MSTS/SHARED/COMMON.DAT"));
            // root, MSTS, ROUTES, USA85, TRACK.TDB, SHARED, COMMON.DAT
            assert_eq!(fixture.tree.node_count(), 7);
        }

        #[test]
        fn test_broken_archive_in_directory_is_skipped() {
            let temp_dir = setup_test_env();
            std::fs::write(temp_dir.path().join("broken.zip"), b"garbage").unwrap();
            std::fs::write(temp_dir.path().join("ok.txt"), b"ok").unwrap();

            let mut fixture = Fixture::new();
            fixture.mount_dir(temp_dir.path(), "/MSTS/");

            assert!(fixture.tree.file_exists("/MSTS/OK.TXT"));
            assert!(!fixture.tree.file_exists("/MSTS/BROKEN.ZIP"));
            assert!(fixture.log.iter().any(|line| line.contains("could not open archive")));
        }
    }

    mod archives {
        use super::*;

        fn setup_zip(temp_dir: &TempDir) -> PathBuf {
            let path = temp_dir.path().join("routes.zip");
            write_zip(
                &path,
                &[
                    ("USA3/", b""),
                    ("USA3/usa3.trk", b"trk"),
                    ("usa3/paths/a.pat", b"pat"),
                    ("Europe/rail.dat", b"rail"),
                    ("inner.zip", b"PK"),
                ],
            );
            path
        }

        #[test]
        fn test_mount_whole_archive() {
            let temp_dir = setup_test_env();
            let zip = setup_zip(&temp_dir);

            let mut fixture = Fixture::new();
            assert_eq!(fixture.mount_zip(&zip, None, "/MSTS/").unwrap(), 4);

            assert!(fixture.tree.file_exists("/MSTS/USA3/USA3.TRK"));
            assert!(fixture.tree.file_exists("/MSTS/USA3/PATHS/A.PAT"));
            assert!(fixture.tree.file_exists("/MSTS/EUROPE/RAIL.DAT"));
            // nested archives are visible as plain entries, never expanded
            assert!(fixture.tree.file_exists("/MSTS/INNER.ZIP"));
        }

        #[test]
        fn test_mount_archive_sub_path() {
            let temp_dir = setup_test_env();
            let zip = setup_zip(&temp_dir);

            let mut fixture = Fixture::new();
            let mounted = fixture.mount_zip(&zip, Some("usa3/"), "/MSTS/ROUTES/USA3/").unwrap();
            assert_eq!(mounted, 2);

            assert!(fixture.tree.file_exists("/MSTS/ROUTES/USA3/USA3.TRK"));
            assert!(fixture.tree.file_exists("/MSTS/ROUTES/USA3/PATHS/A.PAT"));
            assert!(!fixture.tree.file_exists("/MSTS/ROUTES/USA3/EUROPE/RAIL.DAT"));
            assert_eq!(
                fixture.kind("/MSTS/ROUTES/USA3/PATHS/A.PAT"),
                NodeKind::archive_file(&zip, "usa3/paths/a.pat")
            );
        }

        #[test]
        fn test_sub_path_must_be_a_directory() {
            let temp_dir = setup_test_env();
            let zip = setup_zip(&temp_dir);

            let mut fixture = Fixture::new();
            let mounted = fixture.mount_zip(&zip, Some("USA3"), "/MSTS/").unwrap();
            assert_eq!(mounted, 0);
        }

        #[test]
        fn test_failed_archive_adds_nothing() {
            let temp_dir = setup_test_env();
            let broken = temp_dir.path().join("broken.zip");
            std::fs::write(&broken, b"garbage").unwrap();

            let mut fixture = Fixture::new();
            let result = fixture.mount_zip(&broken, None, "/MSTS/X/");
            assert!(matches!(result, Err(VfsError::ArchiveOpen { .. })));
            let x = fixture.tree.find_directory(fixture.tree.root(), "/MSTS/X").unwrap();
            assert_eq!(fixture.tree.children(x).count(), 0);
        }

        #[test]
        fn test_archive_file_never_replaces_directory() {
            let temp_dir = setup_test_env();
            let real = temp_dir.path().join("real");
            std::fs::create_dir_all(real.join("europe")).unwrap();
            std::fs::write(real.join("europe/keep.txt"), b"keep").unwrap();
            let zip = temp_dir.path().join("clash.zip");
            write_zip(&zip, &[("europe", b"a file named like the directory")]);

            let mut fixture = Fixture::new();
            fixture.mount_dir(&real, "/MSTS/");
            fixture.mount_zip(&zip, None, "/MSTS/").unwrap();

            assert!(fixture.tree.directory_exists("/MSTS/EUROPE"));
            assert!(fixture.tree.file_exists("/MSTS/EUROPE/KEEP.TXT"));
        }
    }
}
