//! Metadata preservation for extracted files.

use std::path::Path;

use super::{Entry, ExtractionOptions};

/// Applies the entry's modification time and permission bits to an
/// extracted file as configured. Failures are logged, not returned.
pub(crate) fn apply_metadata(path: &Path, entry: &Entry, options: &ExtractionOptions) {
    if options.preserve_file_time {
        if let Some(modified) = entry.modified {
            let mtime = filetime::FileTime::from_system_time(modified);
            if let Err(e) = filetime::set_file_mtime(path, mtime) {
                log::warn!(
                    "Failed to set modification time on '{}': {}",
                    path.display(),
                    e
                );
            }
        }
    }

    if options.preserve_attributes {
        if let Some(mode) = entry.attributes {
            apply_file_attributes(path, mode);
        }
    }
}

/// Applies unix permission bits to an extracted file.
#[cfg(unix)]
fn apply_file_attributes(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
    {
        log::warn!("Failed to set permissions on '{}': {}", path.display(), e);
    }
}

/// Maps the owner write bit onto the read-only flag.
#[cfg(not(unix))]
fn apply_file_attributes(path: &Path, mode: u32) {
    if mode & 0o200 != 0 {
        return;
    }
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mut perms = metadata.permissions();
            perms.set_readonly(true);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                log::warn!(
                    "Failed to set read-only attribute on '{}': {}",
                    path.display(),
                    e
                );
            }
        }
        Err(e) => log::warn!("Failed to read metadata of '{}': {}", path.display(), e),
    }
}
