//! Path validation for objects inside a remote repository.
//!
//! Remote paths always use `/` as the separator, regardless of the host
//! platform, so this works on plain strings rather than [`std::path::Path`].

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a repository-relative path.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment and
/// must never climb above the repository root. Null bytes and backslashes
/// are rejected outright.
///
/// # Examples
///
/// ```
/// use gitshelf_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("files/ab/abc.png").is_ok());
/// assert!(validate_path("a/../file.txt").is_ok()); // (never leaves repository root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../still-wrong/.././correct//./path.txt/").unwrap(),
///     "correct/path.txt"
/// );
/// ```
pub fn validate(path: impl AsRef<str>) -> Result<String> {
    let raw = path.as_ref();
    if raw.contains('\0') || raw.contains('\\') {
        exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
                }
            },
            s => segments.push(s),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(raw.to_string())),
        false => Ok(segments.join("/")),
    }
}

/// Like [`validate`], but an empty path (or one that normalizes to empty)
/// means the repository root and is returned as `""`.
pub fn validate_dir(path: impl AsRef<str>) -> Result<String> {
    let raw = path.as_ref();
    if raw.split('/').all(|s| s.is_empty() || s == ".") {
        return Ok(String::new());
    }
    validate(raw)
}

/// Last segment of a remote path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
