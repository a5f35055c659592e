//! Path normalization.
//!
//! Two path flavours live side by side in the overlay:
//! - **system paths** point into the host filesystem. They are made absolute and use `/` as the
//!   only separator, but their case is left untouched.
//! - **virtual paths** address nodes of the overlay tree. They are `/`-separated, upper-cased and
//!   flattened (`.` and `..` are resolved lexically), which makes every lookup case-insensitive.
//!
//! A trailing `/` is significant in both flavours (it marks a directory) and is preserved.

use std::path::{Path, PathBuf};

/// Makes `path` absolute and converts every separator to `/`.
///
/// Surrounding quotes are trimmed. Relative paths are resolved against the current working
/// directory; `.` and `..` segments are folded without touching the disk.
pub fn normalize_system_path(path: &str) -> String {
    let slashed = path.trim().trim_matches('"').replace('\\', "/");
    let trailing = slashed.ends_with('/');

    let absolute = if Path::new(&slashed).is_absolute() {
        PathBuf::from(&slashed)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&slashed),
            Err(_) => PathBuf::from(&slashed),
        }
    };

    let mut result = flatten(&absolute.to_string_lossy().replace('\\', "/"));
    if trailing && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Brings a virtual path into its canonical form: `/` separators, no quotes, upper case,
/// no `//`, `.` or `..` segments. `..` never climbs above the root.
pub fn normalize_virtual_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    flatten(slashed.trim_matches('"').to_uppercase().as_str())
}

/// Returns the directory part of a virtual path: `/A/B.TXT` -> `/A`, `/B.TXT` -> `/`.
pub fn virtual_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Returns the last segment of a virtual path: `/A/B.TXT` -> `B.TXT`, `/A/` -> ``.
pub fn virtual_file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

fn flatten(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    let rooted = path.starts_with('/');

    let mut result: Vec<&str> = Vec::with_capacity(segments.len());
    for (idx, segment) in segments.into_iter().enumerate() {
        match segment {
            "." => {}
            ".." => {
                // the leading empty segment is the root and is never popped
                let floor = usize::from(rooted);
                if result.len() > floor {
                    result.pop();
                }
            }
            "" if idx != 0 && idx != last => {}
            _ => result.push(segment),
        }
    }

    if rooted && result.len() <= 1 {
        return "/".to_string();
    }
    if rooted && result.len() == 2 && result[1].is_empty() {
        return "/".to_string();
    }
    result.join("/")
}
