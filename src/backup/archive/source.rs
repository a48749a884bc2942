use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable, ENTRY_SEPARATOR};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};

use bon::Builder;
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use walkdir::{DirEntry, WalkDir};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A source directory to be archived
///
/// Every entry below `path` is written under `internal_prefix` inside the
/// archive (at the archive root when the prefix is empty). Any file or
/// directory whose literal name is in `excluded_names` is skipped together
/// with its subtree, at any depth.
#[derive(Clone, Debug, Builder, PartialEq, Eq, Hash, Getters)]
#[getset(get = "pub")]
pub struct ArchiveSource {
    #[builder(into)]
    path: PathBuf,
    #[builder(default, into)]
    internal_prefix: String,
    #[builder(default)]
    excluded_names: BTreeSet<String>,
}

impl ArchiveSource {
    fn normalized_prefix(&self) -> String {
        self.internal_prefix
            .trim_matches(ENTRY_SEPARATOR)
            .to_owned()
    }
}

impl ArchiveEntryIterable for ArchiveSource {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.path.is_dir() {
            tracing::error!(
                "Source directory does not exist or is not a directory: {:?}",
                self.path
            );
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} is not a directory", self.path),
            )));
        }

        tracing::info!(
            "Starting directory scan: {:?} -> {:?}, excluding {:?}",
            self.path,
            self.internal_prefix,
            self.excluded_names
        );

        let src_dir = self.path.clone();
        let prefix = self.normalized_prefix();
        let excluded = self.excluded_names.clone();

        let root = (!prefix.is_empty())
            .then(|| Ok(ArchiveEntry::directory(src_dir.clone(), &prefix)));

        let entries = WalkDir::new(&self.path)
            .min_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_entry(move |de| !is_excluded(de, &excluded))
            .map(move |res| {
                res.map_err(Error::from)
                    .and_then(|de| process_dir_entry(de, &src_dir, &prefix))
            })
            .map(move |res| res.with_fn_name(function_path!()));

        Ok(root.into_iter().chain(entries).into_dyn_iter())
    }
}

fn is_excluded(de: &DirEntry, excluded: &BTreeSet<String>) -> bool {
    let skip = de
        .file_name()
        .to_str()
        .is_some_and(|name| excluded.contains(name));
    if skip {
        tracing::debug!("Skipping excluded {:?}", de.path());
    }
    skip
}

fn process_dir_entry(de: DirEntry, base_src_dir: &Path, prefix: &str) -> Result<ArchiveEntry> {
    let is_dir = de.file_type().is_dir();
    let p = de.into_path();
    let name = match p.strip_prefix(base_src_dir) {
        Ok(relative) => entry_name(prefix, relative)?,
        Err(e) => {
            return Err(Error::from(e).with_msg(format!(
                "Stripping {:?} from {:?} failed",
                base_src_dir, p
            )))
        }
    };

    let entry = if is_dir {
        ArchiveEntry::directory(p, &name)
    } else {
        ArchiveEntry::file(p, name)
    };
    tracing::trace!("Including: {:?} -> {:?}", entry.src, entry.dst);
    Ok(entry)
}

/// Builds the `/`-separated archive name of `relative`, nested under `prefix`
pub fn entry_name(prefix: &str, relative: &Path) -> Result<String> {
    let segments = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| Error::NonUtf8Path(relative.to_path_buf()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(std::iter::once(prefix)
        .filter(|p| !p.is_empty())
        .chain(segments)
        .join(&ENTRY_SEPARATOR.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn create_test_files(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("sub"))?;
        std::fs::create_dir_all(dir.join("tmp"))?;
        std::fs::create_dir_all(dir.join("sub/tmp"))?;
        std::fs::write(dir.join("a.txt"), "x")?;
        std::fs::write(dir.join("sub/b.txt"), "y")?;
        std::fs::write(dir.join("tmp/c.txt"), "z")?;
        std::fs::write(dir.join("sub/tmp/d.txt"), "w")?;
        Ok(())
    }

    fn names(source: &ArchiveSource) -> HashSet<String> {
        source
            .archive_entry_iterator()
            .unwrap()
            .map(|e| e.unwrap().dst.to_string())
            .collect()
    }

    #[test]
    fn test_entry_name_with_and_without_prefix() {
        assert_eq!(entry_name("", Path::new("a.txt")).unwrap(), "a.txt");
        assert_eq!(
            entry_name("images", Path::new("12/pic.jpg")).unwrap(),
            "images/12/pic.jpg"
        );
    }

    #[test]
    fn test_iterator_without_prefix_skips_excluded_at_any_depth() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();

        let source = ArchiveSource::builder()
            .path(temp_dir.path())
            .excluded_names(BTreeSet::from(["tmp".to_owned()]))
            .build();

        let expected: HashSet<String> = ["a.txt", "sub/", "sub/b.txt"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names(&source), expected);
    }

    #[test]
    fn test_iterator_with_prefix_emits_prefix_directory_first() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();

        let source = ArchiveSource::builder()
            .path(temp_dir.path())
            .internal_prefix("images/")
            .build();

        let entries: Vec<_> = source
            .archive_entry_iterator()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(entries[0].dst.as_ref(), "images/");
        assert!(entries[0].is_dir());

        let all = names(&source);
        assert!(all.contains("images/tmp/c.txt"));
        assert!(all.contains("images/sub/tmp/d.txt"));
        assert!(all.iter().all(|n| n.starts_with("images/")));
    }

    #[test]
    fn test_directories_come_before_their_children() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();

        let source = ArchiveSource::builder().path(temp_dir.path()).build();
        let order: Vec<String> = source
            .archive_entry_iterator()
            .unwrap()
            .map(|e| e.unwrap().dst.to_string())
            .collect();

        let dir_idx = order.iter().position(|n| n == "sub/").unwrap();
        let child_idx = order.iter().position(|n| n == "sub/b.txt").unwrap();
        assert!(dir_idx < child_idx);
    }

    #[test]
    fn test_iterator_with_nonexistent_directory() {
        let source = ArchiveSource::builder()
            .path("/nonexistent/directory")
            .internal_prefix("images")
            .build();

        assert!(source.archive_entry_iterator().is_err());
    }

    #[test]
    fn test_iterator_with_file_as_source() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_directory.txt");
        std::fs::write(&file_path, "content").unwrap();

        let source = ArchiveSource::builder().path(file_path).build();
        assert!(source.archive_entry_iterator().is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = ArchiveSource::builder()
            .path("/data/images")
            .internal_prefix("images")
            .excluded_names(BTreeSet::from(["tmp".to_owned()]))
            .build();
        let b = ArchiveSource::builder()
            .path("/data/images")
            .internal_prefix("images")
            .excluded_names(BTreeSet::from(["tmp".to_owned()]))
            .build();
        let c = ArchiveSource::builder()
            .path("/data/images")
            .internal_prefix("images")
            .build();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
