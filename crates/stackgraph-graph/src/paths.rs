use std::path::{Component as PathPart, Path, PathBuf};

/// Lexically normalizes a path: drops `.` segments and resolves `..`
/// against preceding segments without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;

    for part in path.components() {
        match part {
            PathPart::CurDir => {}
            PathPart::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            PathPart::Normal(segment) => {
                cleaned.push(segment);
                depth += 1;
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Joins `raw` onto `base` (unless already absolute) and cleans the result.
pub fn join_clean(base: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        clean_path(raw)
    } else {
        clean_path(&base.join(raw))
    }
}

/// Resolves symlinks for consistent cross-platform comparison (e.g.
/// `/var` vs `/private/var`). Permissive: when resolution fails, the
/// lexically cleaned input is returned instead of an error.
pub fn canonicalize_permissive(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(_) => clean_path(path),
    }
}
