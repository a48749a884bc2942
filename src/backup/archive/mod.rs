pub mod source;

pub use source::ArchiveSource;

use crate::backup::result_error::result::Result;
use dyn_iter::DynIter;
use std::path::Path;
use std::sync::Arc;

/// Zip entry names always use `/`, whatever the host separator is.
pub const ENTRY_SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Represents a single file or directory to be written into a backup archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Source file/directory path on the filesystem
    pub src: Arc<Path>,

    /// Entry name inside the archive
    ///
    /// Directory names end with [`ENTRY_SEPARATOR`], file names never do.
    pub dst: Arc<str>,

    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn directory<A: Into<Arc<Path>>>(src: A, name: &str) -> ArchiveEntry {
        let dst = if name.ends_with(ENTRY_SEPARATOR) {
            name.to_owned()
        } else {
            format!("{name}{ENTRY_SEPARATOR}")
        };
        Self {
            src: src.into(),
            dst: dst.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn file<A: Into<Arc<Path>>, B: Into<Arc<str>>>(src: A, name: B) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Trait for generating archive entries from a source description
///
/// The iterator yields Results to handle errors during source scanning
/// (e.g., permission denied, files removed mid-walk).
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}
