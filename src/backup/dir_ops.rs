//! Directory helpers shared by the coordinator and the swap phase.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Removes every child of `dir`, keeping `dir` itself. Missing dir is a no-op.
pub fn clear_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(());
    }

    for child in fs::read_dir(dir)? {
        let path = child?.path();
        let res = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        res.map_err(Error::from)
            .with_msg(format!("Removing {:?} failed", path))?;
    }
    tracing::debug!("Cleared {:?}", dir);
    Ok(())
}

/// Creates `dir` if needed and leaves it empty.
pub fn ensure_clean_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    clear_dir(dir)
}

pub fn remove_dir_if_exists<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::from(e).with_msg(format!("Removing {:?} failed", dir))),
    }
}

/// Copies the tree under `src` into `dst`, overwriting files that already exist.
///
/// Files in `dst` with no counterpart in `src` are left alone. Returns the
/// number of files copied.
pub fn copy_dir_recursively<P1: AsRef<Path>, P2: AsRef<Path>>(src: P1, dst: P2) -> Result<usize> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for de in WalkDir::new(src).min_depth(1).follow_links(true) {
        let de = de?;
        let target = dst.join(de.path().strip_prefix(src)?);
        if de.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(de.path(), &target)
                .map_err(Error::from)
                .with_msg(format!("Copying {:?} to {:?} failed", de.path(), target))?;
            copied += 1;
        }
    }
    tracing::debug!("Copied {} files from {:?} to {:?}", copied, src, dst);
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_dir_removes_nested_content_but_keeps_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("backup");
        fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        fs::write(dir.join("nested/deeper/f.txt"), "f").unwrap();
        fs::write(dir.join("top.zip"), "zip").unwrap();

        clear_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_dir_on_missing_dir_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        assert!(clear_dir(temp_dir.path().join("missing")).is_ok());
    }

    #[test]
    fn test_ensure_clean_dir_creates_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a/b");
        ensure_clean_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_copy_dir_recursively_overwrites_and_keeps_unrelated() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(src.join("sub/empty")).unwrap();
        fs::write(src.join("store.db"), "new").unwrap();
        fs::write(src.join("sub/b.txt"), "b").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("store.db"), "old").unwrap();
        fs::write(dst.join("other.db"), "other").unwrap();

        let copied = copy_dir_recursively(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(dst.join("store.db")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("sub/b.txt")).unwrap(), "b");
        assert_eq!(fs::read_to_string(dst.join("other.db")).unwrap(), "other");
        assert!(dst.join("sub/empty").is_dir());
    }

    #[test]
    fn test_remove_dir_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("gone");
        fs::create_dir_all(dir.join("x")).unwrap();

        remove_dir_if_exists(&dir).unwrap();
        assert!(!dir.exists());
        remove_dir_if_exists(&dir).unwrap();
    }
}
