//! Path safety validation for archive extraction.

use std::path::{Component, Path, PathBuf};

use super::PathSafety;
use crate::{Error, Result};

/// Turns an archive path into a relative filesystem path under the
/// configured policy.
///
/// Empty and `.` components are dropped. The returned path never starts
/// with a root or prefix unless validation is disabled.
pub(crate) fn validate_path(entry_path: &str, policy: PathSafety) -> Result<PathBuf> {
    let reject = || Error::PathTraversal {
        path: entry_path.to_string(),
    };

    if policy == PathSafety::Disabled {
        return Ok(PathBuf::from(entry_path));
    }
    if policy == PathSafety::Strict && (entry_path.contains('\\') || has_drive_prefix(entry_path))
    {
        return Err(reject());
    }

    let mut relative = PathBuf::new();
    for component in Path::new(entry_path).components() {
        match component {
            Component::Normal(name) => relative.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(reject());
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(reject());
    }
    Ok(relative)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
