//! Path normalization for project roots and working directories.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically cleaned form of `path`, resolving symlinks when the
/// path exists.
///
/// Relative paths are taken from the process working directory. `.` and `..`
/// components and trailing separators are removed, the same way `$PWD` looks.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let cleaned = clean(&absolute);
    match fs::canonicalize(&cleaned) {
        Ok(real) => Ok(real),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(cleaned),
        Err(e) => Err(e),
    }
}

/// Lexical cleanup only, never touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_removes_dots_and_trailing_separators() {
        assert_eq!(clean(Path::new("/a/./b/")), PathBuf::from("/a/b"));
        assert_eq!(clean(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(clean(Path::new("../../a")), PathBuf::from("../../a"));
    }

    #[test]
    fn resolve_keeps_missing_paths_lexical() {
        let p = resolve(Path::new("/definitely/not/here/../there")).unwrap();
        assert_eq!(p, PathBuf::from("/definitely/not/there"));
    }

    #[test]
    fn resolve_makes_relative_paths_absolute() {
        let p = resolve(Path::new("some/rel")).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("some/rel"));
    }
}
