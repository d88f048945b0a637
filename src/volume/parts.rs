//! Multi-part name discovery.
//!
//! Split archives name their parts after a numbered convention. Given the
//! first part, [`file_parts`] enumerates the siblings in ascending order
//! without opening them.
//!
//! | Scheme | First part | Following parts |
//! |--------|------------|-----------------|
//! | Numbered suffix | `data.zip.001` | `data.zip.002`, `data.zip.003`, ... |
//! | Part number | `data.part1.rar` / `x.part01` | `data.part2.rar` / `x.part02`, ... |
//! | RAR legacy | `data.rar` | `data.r00`, `data.r01`, ... |
//! | Split ZIP | `data.z01` | `data.z02`, ..., `data.zip` (always last) |
//!
//! Any other name is a single-part archive.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A recognized multi-part naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartScheme {
    /// `base.001`, `base.002`, ... with the digit width of the first part.
    Numbered {
        /// Name up to, not including, the numeric extension.
        base: String,
        /// Number of digits in the extension.
        width: usize,
    },
    /// `stem.part1.rar` or `stem.part1`, digit width preserved.
    PartNumber {
        /// Name up to, not including, `.partN`.
        stem: String,
        /// The literal `part` marker as spelled in the first name.
        marker: String,
        /// Number of digits after the marker.
        width: usize,
        /// Trailing extension including its dot, or empty.
        suffix: String,
    },
    /// `stem.rar` followed by `stem.r00`, `stem.r01`, ...
    RarLegacy {
        /// Name up to, not including, `.rar`.
        stem: String,
        /// Whether the first part used an upper-case extension.
        upper: bool,
    },
    /// `stem.z01`, `stem.z02`, ... with `stem.zip` as the final part.
    SplitZip {
        /// Name up to, not including, the extension.
        stem: String,
        /// Whether the first part used an upper-case extension.
        upper: bool,
    },
}

impl PartScheme {
    /// Recognizes the scheme of a first-part file name.
    ///
    /// Returns `Ok(None)` for single-part names. A name that belongs to a
    /// scheme but is not its first part is an error. `has_sibling` is asked
    /// whether a sibling file exists; it decides whether `data.zip` is the
    /// tail of a split ZIP and whether `data.rar` has legacy parts.
    pub fn detect(name: &str, has_sibling: impl Fn(&str) -> bool) -> Result<Option<Self>> {
        let not_first = |reason: &str| Error::VolumeResolution {
            path: PathBuf::from(name),
            reason: reason.to_string(),
        };

        if let Some((stem, marker, digits, suffix)) = split_part_number(name) {
            let scheme = PartScheme::PartNumber {
                stem: stem.to_string(),
                marker: marker.to_string(),
                width: digits.len(),
                suffix: suffix.to_string(),
            };
            if parse_number(digits) == Some(1) {
                return Ok(Some(scheme));
            }
            if has_sibling(&scheme.part_name(0)) {
                return Err(not_first("not the first part of a .partN series"));
            }
            return Ok(None);
        }

        let Some((stem, ext)) = name.rsplit_once('.') else {
            return Ok(None);
        };
        if stem.is_empty() {
            return Ok(None);
        }
        let upper = ext.chars().any(|c| c.is_ascii_uppercase());

        if ext.len() >= 2 && ext.bytes().all(|b| b.is_ascii_digit()) {
            let scheme = PartScheme::Numbered {
                base: stem.to_string(),
                width: ext.len(),
            };
            if parse_number(ext) == Some(1) {
                return Ok(Some(scheme));
            }
            if has_sibling(&scheme.part_name(0)) {
                return Err(not_first("not the first part of a numbered series"));
            }
            return Ok(None);
        }

        let lower = ext.to_ascii_lowercase();
        if lower == "rar" {
            let scheme = PartScheme::RarLegacy {
                stem: stem.to_string(),
                upper,
            };
            return Ok(has_sibling(&scheme.part_name(1)).then_some(scheme));
        }
        if lower == "zip" {
            let scheme = PartScheme::SplitZip {
                stem: stem.to_string(),
                upper,
            };
            return Ok(has_sibling(&scheme.part_name(0)).then_some(scheme));
        }
        if numbered_ext(&lower, 'r').is_some() {
            return Err(not_first("legacy RAR parts start at the .rar file"));
        }
        if let Some(number) = numbered_ext(&lower, 'z') {
            if number != 1 {
                return Err(not_first("not the first part of a split ZIP"));
            }
            return Ok(Some(PartScheme::SplitZip {
                stem: stem.to_string(),
                upper,
            }));
        }
        Ok(None)
    }

    /// Returns the file name of the part at 0-based position `index`.
    ///
    /// For [`PartScheme::SplitZip`] this is the `.zNN` name; the closing
    /// `.zip` part is given by [`final_name`](Self::final_name).
    pub fn part_name(&self, index: usize) -> String {
        match self {
            PartScheme::Numbered { base, width } => {
                format!("{}.{:0width$}", base, index + 1, width = *width)
            }
            PartScheme::PartNumber {
                stem,
                marker,
                width,
                suffix,
            } => format!("{}.{}{:0width$}{}", stem, marker, index + 1, suffix, width = *width),
            PartScheme::RarLegacy { stem, upper } => match index {
                0 => format!("{}.{}", stem, cased("rar", *upper)),
                n => format!("{}.{}{:02}", stem, cased("r", *upper), n - 1),
            },
            PartScheme::SplitZip { stem, upper } => {
                format!("{}.{}{:02}", stem, cased("z", *upper), index + 1)
            }
        }
    }

    /// Returns the name of a mandatory closing part, if the scheme has one.
    pub fn final_name(&self) -> Option<String> {
        match self {
            PartScheme::SplitZip { stem, upper } => Some(format!("{}.{}", stem, cased("zip", *upper))),
            _ => None,
        }
    }

    /// Returns the 0-based position of `name` within this scheme.
    ///
    /// The closing part of a split ZIP has no fixed position and returns
    /// `None`, as do names outside the scheme.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        match self {
            PartScheme::Numbered { base, .. } => {
                let (stem, ext) = name.rsplit_once('.')?;
                if !stem.eq_ignore_ascii_case(base) {
                    return None;
                }
                parse_number(ext)?.checked_sub(1)
            }
            PartScheme::PartNumber { stem, suffix, .. } => {
                let (s, _, digits, sfx) = split_part_number(name)?;
                if !s.eq_ignore_ascii_case(stem) || !sfx.eq_ignore_ascii_case(suffix) {
                    return None;
                }
                parse_number(digits)?.checked_sub(1)
            }
            PartScheme::RarLegacy { stem, .. } => {
                let (s, ext) = name.rsplit_once('.')?;
                if !s.eq_ignore_ascii_case(stem) {
                    return None;
                }
                let ext = ext.to_ascii_lowercase();
                if ext == "rar" {
                    return Some(0);
                }
                numbered_ext(&ext, 'r').map(|n| n + 1)
            }
            PartScheme::SplitZip { stem, .. } => {
                let (s, ext) = name.rsplit_once('.')?;
                if !s.eq_ignore_ascii_case(stem) {
                    return None;
                }
                numbered_ext(&ext.to_ascii_lowercase(), 'z')?.checked_sub(1)
            }
        }
    }
}

fn cased(text: &str, upper: bool) -> String {
    if upper {
        text.to_ascii_uppercase()
    } else {
        text.to_string()
    }
}

fn parse_number(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parses extensions such as `r00` or `z01` into their number.
fn numbered_ext(lower_ext: &str, letter: char) -> Option<usize> {
    let digits = lower_ext.strip_prefix(letter)?;
    if digits.len() < 2 {
        return None;
    }
    parse_number(digits)
}

/// Splits `stem.partN[.ext]` into `(stem, marker, digits, suffix)`.
fn split_part_number(name: &str) -> Option<(&str, &str, &str, &str)> {
    let lower = name.to_ascii_lowercase();
    let (body, suffix_start) = match lower.rsplit_once('.') {
        Some((body, ext)) if !ext.starts_with("part") => (body, body.len()),
        _ => (lower.as_str(), lower.len()),
    };
    let dot = body.rfind(".part")?;
    let digits_start = dot + ".part".len();
    let digits = &name[digits_start..suffix_start];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || dot == 0 {
        return None;
    }
    Some((
        &name[..dot],
        &name[dot + 1..digits_start],
        digits,
        &name[suffix_start..],
    ))
}

/// Returns the ordered list of parts that make up the archive starting at
/// `first`.
///
/// The result contains `first` itself followed by every sibling part, in
/// ascending order. Parts are not opened. Single-part archives yield a list
/// with one element.
///
/// # Errors
///
/// Returns [`Error::VolumeResolution`] if `first` does not exist or is not
/// the first part of its series, if a mandatory closing part is missing, or
/// if numbering is not contiguous (a higher-numbered part exists after a
/// gap).
///
/// # Example
///
/// ```rust,no_run
/// let parts = polyarc::volume::file_parts("backup.part1.rar")?;
/// for part in &parts {
///     println!("{}", part.display());
/// }
/// # Ok::<(), polyarc::Error>(())
/// ```
pub fn file_parts(first: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let first = first.as_ref();
    if !first.is_file() {
        return Err(Error::VolumeResolution {
            path: first.to_path_buf(),
            reason: "first part does not exist".into(),
        });
    }
    let dir = first.parent().unwrap_or_else(|| Path::new(""));
    let Some(name) = first.file_name().and_then(|n| n.to_str()) else {
        return Ok(vec![first.to_path_buf()]);
    };

    let Some(scheme) = PartScheme::detect(name, |sibling| dir.join(sibling).is_file())? else {
        log::trace!("'{}' is a single-part archive", first.display());
        return Ok(vec![first.to_path_buf()]);
    };

    let mut parts = Vec::new();
    let first_is_tail = scheme
        .final_name()
        .is_some_and(|tail| tail.eq_ignore_ascii_case(name));
    if !first_is_tail {
        parts.push(first.to_path_buf());
    }
    loop {
        let next = dir.join(scheme.part_name(parts.len()));
        if !next.is_file() {
            break;
        }
        parts.push(next);
    }

    check_no_gap(dir, &scheme, parts.len())?;

    if let Some(tail) = scheme.final_name() {
        let tail = dir.join(tail);
        if !tail.is_file() {
            return Err(Error::VolumeResolution {
                path: tail,
                reason: "closing part of the split archive is missing".into(),
            });
        }
        parts.push(tail);
    }

    log::debug!(
        "Discovered {} part(s) starting at '{}' ({:?})",
        parts.len(),
        first.display(),
        scheme
    );
    Ok(parts)
}

/// Fails if any sibling in `dir` sits at or beyond position `found` of the
/// scheme, meaning part `found` is missing from the middle of the series.
fn check_no_gap(dir: &Path, scheme: &PartScheme, found: usize) -> Result<()> {
    let listing_dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let Ok(listing) = std::fs::read_dir(listing_dir) else {
        return Ok(());
    };
    let beyond = listing
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| scheme.position_of(&name))
        .any(|position| position > found);
    if beyond {
        return Err(Error::VolumeResolution {
            path: dir.join(scheme.part_name(found)),
            reason: "part is missing; numbering is not contiguous".into(),
        });
    }
    Ok(())
}

/// Checks that an explicit part list follows the naming scheme of its first
/// part, in order and without gaps.
///
/// Lists whose first name belongs to no scheme are accepted as given.
pub fn validate_sequence<P: AsRef<Path>>(parts: &[P]) -> Result<()> {
    let Some(first) = parts.first().map(AsRef::as_ref) else {
        return Ok(());
    };
    if parts.len() == 1 {
        return Ok(());
    }
    let Some(first_name) = first.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    let names: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.as_ref().file_name().and_then(|n| n.to_str()))
        .collect();
    let Some(scheme) = PartScheme::detect(first_name, |sibling| {
        names.iter().any(|n| n.eq_ignore_ascii_case(sibling))
    })?
    else {
        return Ok(());
    };

    let mut body = parts.iter().map(AsRef::as_ref).collect::<Vec<&Path>>();
    if let Some(tail) = scheme.final_name() {
        let last = body.pop().unwrap_or(first);
        let last_name = last.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !last_name.eq_ignore_ascii_case(&tail) {
            return Err(Error::VolumeResolution {
                path: last.to_path_buf(),
                reason: format!("expected '{}' as the final part", tail),
            });
        }
    }
    for (index, part) in body.iter().enumerate() {
        let expected = scheme.part_name(index);
        let actual = part.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(Error::VolumeResolution {
                path: part.to_path_buf(),
                reason: format!("expected part '{}' at position {}", expected, index + 1),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
    }

    fn names(parts: &[PathBuf]) -> Vec<String> {
        parts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_part_number_scheme() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["x.part1", "x.part2", "x.part3"]);
        let parts = file_parts(dir.path().join("x.part1")).unwrap();
        assert_eq!(names(&parts), ["x.part1", "x.part2", "x.part3"]);
    }

    #[test]
    fn test_part_number_width_and_suffix() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["b.part01.rar", "b.part02.rar", "b.part10.rar"]);
        let err = file_parts(dir.path().join("b.part01.rar")).unwrap_err();
        assert!(matches!(err, Error::VolumeResolution { .. }));

        touch(
            dir.path(),
            &[
                "b.part03.rar",
                "b.part04.rar",
                "b.part05.rar",
                "b.part06.rar",
                "b.part07.rar",
                "b.part08.rar",
                "b.part09.rar",
            ],
        );
        let parts = file_parts(dir.path().join("b.part01.rar")).unwrap();
        assert_eq!(parts.len(), 10);
        assert_eq!(names(&parts)[9], "b.part10.rar");
    }

    #[test]
    fn test_numbered_suffix_scheme() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["a.zip.001", "a.zip.002"]);
        let parts = file_parts(dir.path().join("a.zip.001")).unwrap();
        assert_eq!(names(&parts), ["a.zip.001", "a.zip.002"]);
    }

    #[test]
    fn test_rar_legacy_scheme() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["r.rar", "r.r00", "r.r01"]);
        let parts = file_parts(dir.path().join("r.rar")).unwrap();
        assert_eq!(names(&parts), ["r.rar", "r.r00", "r.r01"]);
    }

    #[test]
    fn test_split_zip_ends_with_zip() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["s.z01", "s.z02", "s.zip"]);
        let from_first = file_parts(dir.path().join("s.z01")).unwrap();
        assert_eq!(names(&from_first), ["s.z01", "s.z02", "s.zip"]);
        let from_tail = file_parts(dir.path().join("s.zip")).unwrap();
        assert_eq!(from_first, from_tail);
    }

    #[test]
    fn test_split_zip_missing_tail() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["s.z01", "s.z02"]);
        let err = file_parts(dir.path().join("s.z01")).unwrap_err();
        match err {
            Error::VolumeResolution { path, .. } => assert!(path.ends_with("s.zip")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_single_part_names() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["plain.tar.gz", "lone.zip", "lone.rar"]);
        for name in ["plain.tar.gz", "lone.zip", "lone.rar"] {
            let parts = file_parts(dir.path().join(name)).unwrap();
            assert_eq!(names(&parts), [name]);
        }
    }

    #[test]
    fn test_gap_is_reported() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["g.001", "g.002", "g.004"]);
        match file_parts(dir.path().join("g.001")) {
            Err(Error::VolumeResolution { path, .. }) => assert!(path.ends_with("g.003")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_later_part_is_rejected() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &["x.part1", "x.part2"]);
        assert!(file_parts(dir.path().join("x.part2")).is_err());
        assert!(file_parts(dir.path().join("missing.part1")).is_err());
    }

    #[test]
    fn test_validate_sequence() {
        validate_sequence(&["x.part1", "x.part2", "x.part3"]).unwrap();
        validate_sequence(&["s.z01", "s.z02", "s.zip"]).unwrap();
        validate_sequence(&["first-volume", "second-volume"]).unwrap();
        assert!(validate_sequence(&["x.part1", "x.part3"]).is_err());
        assert!(validate_sequence(&["a.001", "a.003"]).is_err());
        assert!(validate_sequence(&["s.z01", "s.z02"]).is_err());
    }

    #[test]
    fn test_position_of() {
        let scheme = PartScheme::detect("x.part1.rar", |_| false).unwrap().unwrap();
        assert_eq!(scheme.position_of("x.part3.rar"), Some(2));
        assert_eq!(scheme.position_of("other.part3.rar"), None);

        let rar = PartScheme::detect("r.rar", |_| true).unwrap().unwrap();
        assert_eq!(rar.position_of("r.rar"), Some(0));
        assert_eq!(rar.position_of("r.r00"), Some(1));
    }
}
