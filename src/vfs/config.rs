//! Mount configuration.
//!
//! A mount table is a list of `<source> <mountpoint>` pairs. It is written either as plain text,
//! one pair per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! "C:\My Routes\USA85\" /MSTS/ROUTES/USA85/
//! C:/TEMP/MSTS1.2.zip /MSTS/
//! C:/routes.zip/USA3/ /MSTS/ROUTES/USA3/
//! ```
//!
//! or as JSON:
//!
//! ```json
//! { "vfsEntries": [ { "source": "C:/My Routes/USA85/", "mountPoint": "/MSTS/ROUTES/USA85/" } ] }
//! ```
//!
//! Sources:
//! - may use `/` or `\`, and must be quoted when they contain spaces (text form);
//! - referring to a directory must end with a separator, so only what is *below* it gets mounted;
//! - referring to an archive must not end with a separator;
//! - may refer to a directory inside an archive, e.g. `C:/routes.zip/USA3/`.
//!
//! Mount points start with `/MSTS/` or `/OR/`, use `/` only, must end with `/` and are
//! case-insensitive.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::archive::is_archive_supported;
use crate::core::utils::{normalize_system_path, normalize_virtual_path};
use crate::core::{VfsError, VfsResult};

pub const MSTS_BASE_PATH: &str = "/MSTS/";
pub const OR_BASE_PATH: &str = "/OR/";
pub const EXECUTABLE_PATH: &str = "/EXECUTABLE/";

/// One parsed line of a mount table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountRecord {
    pub source: String,
    #[serde(rename = "mountPoint")]
    pub mount_point: String,
}

#[derive(Debug, Deserialize)]
struct VfsTableFile {
    #[serde(rename = "vfsEntries", default)]
    vfs_entries: Vec<MountRecord>,
}

/// What a mount source turned out to be after looking at the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// A real directory (normalized, ending with `/`).
    Directory(String),
    /// An archive container, optionally restricted to the entries below `sub_path`.
    Archive {
        archive: PathBuf,
        sub_path: Option<String>,
    },
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r#"^("[^"]+"|\S+)\s+(\S+)$"#).expect("mount line pattern is valid")
    })
}

fn mount_point_regex() -> &'static Regex {
    static MOUNT_POINT: OnceLock<Regex> = OnceLock::new();
    MOUNT_POINT.get_or_init(|| {
        Regex::new(r"(?i)^(/MSTS/|/OR/)([^/\s]+/)*$").expect("mount point pattern is valid")
    })
}

impl MountRecord {
    pub fn new(source: impl Into<String>, mount_point: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mount_point: mount_point.into(),
        }
    }

    /// Parses one text line. Blank lines and `#` comments yield `Ok(None)`.
    pub fn parse_line(line: &str) -> VfsResult<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let captures = line_regex()
            .captures(trimmed)
            .ok_or_else(|| VfsError::config(line, "expected `<source> <mountpoint>`"))?;

        let record = Self::new(captures[1].trim_matches('"'), &captures[2]);
        record.validate(line)?;
        Ok(Some(record))
    }

    /// Checks the mount point. `context` is what gets reported on failure.
    pub fn validate(&self, context: &str) -> VfsResult<()> {
        if self.source.trim().is_empty() {
            return Err(VfsError::config(context, "empty source"));
        }
        if !self.mount_point.ends_with('/') {
            return Err(VfsError::config(
                context,
                "mount point doesn't end with slash (/)",
            ));
        }
        if !mount_point_regex().is_match(&self.mount_point) {
            return Err(VfsError::config(
                context,
                format!("mount point must start with {MSTS_BASE_PATH} or {OR_BASE_PATH}"),
            ));
        }
        Ok(())
    }

    /// The mount point in canonical virtual form.
    pub fn virtual_mount_point(&self) -> String {
        normalize_virtual_path(&self.mount_point)
    }

    /// Looks at the disk to find out what the source refers to.
    ///
    /// In order:
    /// 1. ends with a separator and is an existing directory: a directory mount;
    /// 2. no trailing separator and an existing file: a whole-archive mount, if the extension is
    ///    supported;
    /// 3. ends with a separator but is no directory: the longest existing prefix that is a file
    ///    is taken as the archive, and the rest of the path as the sub-directory to mount from it.
    pub fn classify(&self) -> VfsResult<MountSource> {
        let source = normalize_system_path(&self.source);
        let is_directory = source.ends_with('/');

        if is_directory && Path::new(&source).is_dir() {
            return Ok(MountSource::Directory(source));
        }

        if !is_directory {
            let path = PathBuf::from(&source);
            if !path.is_file() {
                return Err(VfsError::MissingSource(format!(
                    "{}: not an archive file and doesn't end with a separator",
                    self.source
                )));
            }
            if !is_archive_supported(&path) {
                return Err(VfsError::UnsupportedArchiveFormat(path));
            }
            return Ok(MountSource::Archive {
                archive: path,
                sub_path: None,
            });
        }

        // Looking for the archive inside a directory-within-archive path. Index 0 is the root
        // (or a drive letter) and the last piece is the empty one after the trailing slash.
        let pieces: Vec<&str> = source.split('/').collect();
        for idx in 1..pieces.len().saturating_sub(1) {
            let candidate = PathBuf::from(pieces[..=idx].join("/"));
            if candidate.is_file() {
                if !is_archive_supported(&candidate) {
                    return Err(VfsError::UnsupportedArchiveFormat(candidate));
                }
                let sub_path = normalize_virtual_path(&pieces[idx + 1..].join("/"));
                return Ok(MountSource::Archive {
                    archive: candidate,
                    sub_path: Some(sub_path),
                });
            }
            if !candidate.is_dir() {
                // diverged into a path that does not exist
                break;
            }
        }
        Err(VfsError::MissingSource(self.source.clone()))
    }
}

/// Parses a text mount table. Every line yields its own result so a bad line never hides the
/// good ones.
pub fn parse_lines<'a, I>(lines: I) -> Vec<VfsResult<MountRecord>>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter_map(|line| MountRecord::parse_line(line).transpose())
        .collect()
}

/// Parses a JSON mount table. A document that is not valid JSON is a single parse error.
pub fn parse_json(content: &str) -> Vec<VfsResult<MountRecord>> {
    match serde_json::from_str::<VfsTableFile>(content) {
        Ok(table) => table
            .vfs_entries
            .into_iter()
            .map(|record| {
                let context = format!("{} {}", record.source, record.mount_point);
                record.validate(&context).map(|_| record)
            })
            .collect(),
        Err(e) => vec![Err(VfsError::config(
            "<json mount table>",
            e.to_string(),
        ))],
    }
}

/// Reads a mount table file, picking the JSON parser for `.json` files.
pub fn load_table<P: AsRef<Path>>(path: P) -> VfsResult<Vec<VfsResult<MountRecord>>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(parse_json(&content))
    } else {
        Ok(parse_lines(content.lines()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    mod parsing {
        use super::*;

        #[test]
        fn test_parse_bare_line() {
            let record = MountRecord::parse_line("/data/routes/ /MSTS/ROUTES/")
                .unwrap()
                .unwrap();
            assert_eq!(record.source, "/data/routes/");
            assert_eq!(record.mount_point, "/MSTS/ROUTES/");
        }

        #[test]
        fn test_parse_quoted_source() {
            let record = MountRecord::parse_line(r#""C:\My Routes\USA85\" /MSTS/ROUTES/USA85/"#)
                .unwrap()
                .unwrap();
            assert_eq!(record.source, r"C:\My Routes\USA85\");
            assert_eq!(record.virtual_mount_point(), "/MSTS/ROUTES/USA85/");
        }

        #[test]
        fn test_mount_point_is_case_insensitive() {
            let record = MountRecord::parse_line("/data/ /or/Extra/").unwrap().unwrap();
            assert_eq!(record.virtual_mount_point(), "/OR/EXTRA/");
        }

        #[test]
        fn test_blank_and_comment_lines() {
            assert!(MountRecord::parse_line("").unwrap().is_none());
            assert!(MountRecord::parse_line("   ").unwrap().is_none());
            assert!(MountRecord::parse_line("# /data/ /MSTS/").unwrap().is_none());
        }

        #[test]
        fn test_malformed_lines() {
            for line in [
                "/data/routes/",
                "/data/routes/ /MSTS/ROUTES",
                "/data/routes/ /OTHER/",
                "/data/routes/ /EXECUTABLE/",
                "/data/routes/ /MSTS/A B/",
                "/data/ /MSTS//",
            ] {
                let result = MountRecord::parse_line(line);
                assert!(
                    matches!(result, Err(VfsError::ConfigParse { .. })),
                    "{line} should be rejected"
                );
            }
        }

        #[test]
        fn test_parse_lines_keeps_going() {
            let results = parse_lines(["/a/ /MSTS/", "garbage", "", "/b/ /MSTS/X/"]);
            assert_eq!(results.len(), 3);
            assert!(results[0].is_ok());
            assert!(results[1].is_err());
            assert_eq!(results[2].as_ref().unwrap().mount_point, "/MSTS/X/");
        }

        #[test]
        fn test_parse_json_table() {
            let results = parse_json(
                r#"{ "vfsEntries": [
                    { "source": "C:/My Routes/USA85/", "mountPoint": "/MSTS/ROUTES/USA85/" },
                    { "source": "C:/x.zip", "mountPoint": "/MSTS" }
                ] }"#,
            );
            assert_eq!(results.len(), 2);
            assert_eq!(
                results[0].as_ref().unwrap(),
                &MountRecord::new("C:/My Routes/USA85/", "/MSTS/ROUTES/USA85/")
            );
            assert!(results[1].is_err());
        }

        #[test]
        fn test_parse_invalid_json() {
            let results = parse_json("{ not json");
            assert_eq!(results.len(), 1);
            assert!(matches!(results[0], Err(VfsError::ConfigParse { .. })));
        }
    }

    mod classification {
        use super::*;

        fn setup_test_env() -> TempDir {
            TempDir::new("config_test").unwrap()
        }

        fn record(source: String) -> MountRecord {
            MountRecord::new(source, "/MSTS/")
        }

        #[test]
        fn test_directory_source() {
            let temp_dir = setup_test_env();
            let source = format!("{}/", temp_dir.path().display());
            match record(source).classify().unwrap() {
                MountSource::Directory(dir) => assert!(dir.ends_with('/')),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_whole_archive_source() {
            let temp_dir = setup_test_env();
            let archive = temp_dir.path().join("MSTS1.2.ZIP");
            std::fs::write(&archive, b"").unwrap();

            let result = record(archive.display().to_string()).classify().unwrap();
            assert_eq!(
                result,
                MountSource::Archive {
                    archive: PathBuf::from(normalize_system_path(&archive.display().to_string())),
                    sub_path: None
                }
            );
        }

        #[test]
        fn test_unsupported_archive_source() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("notes.txt");
            std::fs::write(&file, b"").unwrap();

            let result = record(file.display().to_string()).classify();
            assert!(matches!(result, Err(VfsError::UnsupportedArchiveFormat(_))));
        }

        #[test]
        fn test_file_without_trailing_separator_missing() {
            let temp_dir = setup_test_env();
            let missing = temp_dir.path().join("missing");
            let result = record(missing.display().to_string()).classify();
            assert!(matches!(result, Err(VfsError::MissingSource(_))));
        }

        #[test]
        fn test_directory_inside_archive() {
            let temp_dir = setup_test_env();
            let archive = temp_dir.path().join("routes.zip");
            std::fs::write(&archive, b"").unwrap();

            let source = format!("{}/usa3/", archive.display());
            match record(source).classify().unwrap() {
                MountSource::Archive { archive: found, sub_path } => {
                    assert!(found.ends_with("routes.zip"));
                    assert_eq!(sub_path.as_deref(), Some("USA3/"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_directory_inside_non_archive() {
            let temp_dir = setup_test_env();
            let file = temp_dir.path().join("plain.txt");
            std::fs::write(&file, b"").unwrap();

            let source = format!("{}/sub/", file.display());
            let result = record(source).classify();
            assert!(matches!(result, Err(VfsError::UnsupportedArchiveFormat(_))));
        }

        #[test]
        fn test_missing_directory_source() {
            let temp_dir = setup_test_env();
            let source = format!("{}/nope/deeper/", temp_dir.path().display());
            let result = record(source).classify();
            assert!(matches!(result, Err(VfsError::MissingSource(_))));
        }

        #[test]
        fn test_load_table_picks_parser() {
            let temp_dir = setup_test_env();
            let text = temp_dir.path().join("vfs.cfg");
            std::fs::write(&text, "/a/ /MSTS/\nbroken\n").unwrap();
            assert_eq!(load_table(&text).unwrap().len(), 2);

            let json = temp_dir.path().join("vfs.JSON");
            std::fs::write(
                &json,
                r#"{"vfsEntries":[{"source":"/a/","mountPoint":"/MSTS/"}]}"#,
            )
            .unwrap();
            let results = load_table(&json).unwrap();
            assert_eq!(results.len(), 1);
            assert!(results[0].is_ok());
        }
    }
}
