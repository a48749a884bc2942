pub mod sqlite;

use crate::backup::result_error::result::Result;
use std::path::Path;

/// The persistence layer as seen by backup/restore
///
/// Import overwrites the files under [`backing_dir`](Self::backing_dir), so
/// the store must release every handle on them first ([`close`](Self::close))
/// and pick the restored files up afterwards ([`reopen`](Self::reopen)).
pub trait PersistenceStore {
    /// Directory holding the store's files, if it is known.
    fn backing_dir(&self) -> Option<&Path>;

    fn close(&mut self) -> Result<()>;

    fn reopen(&mut self) -> Result<()>;
}
