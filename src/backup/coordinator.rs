use crate::backup::archive::ArchiveSource;
use crate::backup::archiver::zip_all;
use crate::backup::dir_ops::{ensure_clean_dir, remove_dir_if_exists};
use crate::backup::extractor::extract_all;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::storage::{
    StorageLocations, SwapMode, DATABASE_ARCHIVE_DIR, IMAGES_ARCHIVE_DIR, TMP_IMAGES_DIR_NAME,
};
use crate::backup::store::PersistenceStore;
use crate::backup::swap::{swap_into_place, SwapStrategy};

use chrono::{Local, NaiveDate};
use derive_more::{From, Into};
use function_name::named;
use tempfile::NamedTempFile;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub static ARCHIVE_FILE_EXT: &str = "zip";
static DATE_FORMAT: &str = "%Y-%m-%d";

/// Which live folders an import has written to
///
/// A flag is set as soon as the live folder may differ from its state before
/// the import, so after a failure it also tells what may be half written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub database_replaced: bool,
    pub images_replaced: bool,
}

impl RestoreReport {
    pub fn any_replaced(&self) -> bool {
        self.database_replaced || self.images_replaced
    }
}

/// A finished backup archive, ready to be handed to a share/export collaborator
#[derive(Clone, Debug, PartialEq, Eq, From, Into)]
pub struct BackupBundle {
    path: PathBuf,
}

impl AsRef<Path> for BackupBundle {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl BackupBundle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Copies the archive out of the staging directory, which the next
    /// operation clears.
    pub fn copy_to<P: AsRef<Path>>(&self, dest: P) -> Result<PathBuf> {
        let dest = dest.as_ref();
        let dest = if dest.is_dir() {
            dest.join(self.path.file_name().unwrap_or_default())
        } else {
            dest.to_path_buf()
        };
        std::fs::copy(&self.path, &dest)
            .map_err(Error::from)
            .with_msg(format!("Copying {:?} to {:?} failed", self.path, dest))?;
        Ok(dest)
    }
}

/// Orchestrates whole-app export and import
///
/// Operations hold an internal lock for their whole duration, so an export
/// and an import on the same coordinator never interleave.
#[derive(Debug)]
pub struct BackupCoordinator {
    locations: StorageLocations,
    op_lock: Mutex<()>,
}

impl BackupCoordinator {
    pub fn new(locations: StorageLocations) -> Self {
        Self {
            locations,
            op_lock: Mutex::new(()),
        }
    }

    pub fn locations(&self) -> &StorageLocations {
        &self.locations
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn archive_file_name(&self, date: NaiveDate) -> String {
        format!(
            "{}_{}.{}",
            self.locations.archive_base_name(),
            date.format(DATE_FORMAT),
            ARCHIVE_FILE_EXT
        )
    }

    /// The images tree (minus `tmp`) and, when it exists, the store directory.
    pub fn archive_sources(&self) -> Vec<ArchiveSource> {
        let mut sources = vec![ArchiveSource::builder()
            .path(self.locations.images_dir())
            .internal_prefix(IMAGES_ARCHIVE_DIR)
            .excluded_names(BTreeSet::from([TMP_IMAGES_DIR_NAME.to_owned()]))
            .build()];

        match self.locations.persistence_store_dir() {
            Some(dir) if dir.is_dir() => sources.push(
                ArchiveSource::builder()
                    .path(dir)
                    .internal_prefix(DATABASE_ARCHIVE_DIR)
                    .build(),
            ),
            Some(dir) => tracing::warn!(
                "Persistence store directory {:?} not found, database is not backed up",
                dir
            ),
            None => tracing::debug!("No persistence store directory configured"),
        }
        sources
    }

    pub fn request_backup(&self) -> Result<BackupBundle> {
        self.request_backup_on(Local::now().date_naive())
    }

    /// Creates `<staging>/<base name>_<yyyy-MM-dd>.zip`
    #[named]
    pub fn request_backup_on(&self, date: NaiveDate) -> Result<BackupBundle> {
        let _guard = self.lock();
        tracing::info!("Trying to create backup...");

        match self.create_bundle(date) {
            Ok(bundle) => {
                tracing::info!("Created backup file: {:?}", bundle.path());
                Ok(bundle)
            }
            Err(e) => {
                tracing::error!("Backup failed: {e}");
                Err(e.with_fn_name(function_path!()).backup_failed())
            }
        }
    }

    fn create_bundle(&self, date: NaiveDate) -> Result<BackupBundle> {
        let staging = self.locations.staging_dir();
        ensure_clean_dir(staging)?;
        std::fs::create_dir_all(self.locations.images_dir())?;

        let zip_path = staging.join(self.archive_file_name(date));
        match zip_all(&self.archive_sources(), &zip_path) {
            Ok(path) => Ok(path.into()),
            Err(e) => Err(match std::fs::remove_file(&zip_path) {
                Ok(()) => e,
                Err(e2) if e2.kind() == std::io::ErrorKind::NotFound => e,
                Err(e2) => e.chain(e2.into()),
            }),
        }
    }

    /// Restores the archive in `reader` over live storage
    ///
    /// The persistence store must not hold its files open during this call;
    /// see [`import_into_store`](Self::import_into_store). Staging is cleared
    /// first, so a [`BackupBundle`] is re-imported with
    /// [`import_file`](Self::import_file), never through a reader on it.
    #[named]
    pub fn import<R: Read + Seek>(&self, reader: R) -> Result<RestoreReport> {
        let _guard = self.lock();
        tracing::info!("Trying to import backup...");

        let staging = self.locations.staging_dir();
        ensure_clean_dir(staging)
            .and_then(|_| extract_all(reader, staging))
            .with_fn_name(function_path!())
            .map_err(|e| {
                tracing::error!("Extracting backup failed, live storage untouched: {e}");
                e.restore_failed(RestoreReport::default())
            })?;

        self.swap_staged()
    }

    pub fn import_file<P: AsRef<Path>>(&self, archive: P) -> Result<RestoreReport> {
        let (reader, _copy) = self.open_archive(archive.as_ref())?;
        self.import(reader)
    }

    pub fn import_file_into_store<S: PersistenceStore + ?Sized, P: AsRef<Path>>(
        &self,
        store: &mut S,
        archive: P,
    ) -> Result<RestoreReport> {
        let (reader, _copy) = self.open_archive(archive.as_ref())?;
        self.import_into_store(store, reader)
    }

    /// Staging is cleared before extraction, so an archive living there is
    /// read from a temporary copy that must outlive the import.
    fn open_archive(&self, archive: &Path) -> Result<(BufReader<File>, Option<NamedTempFile>)> {
        let untouched = |e: std::io::Error| {
            Error::from(e)
                .with_msg(format!("Opening {:?} failed", archive))
                .restore_failed(RestoreReport::default())
        };

        if !self.is_in_staging(archive) {
            let file = File::open(archive).map_err(untouched)?;
            return Ok((BufReader::new(file), None));
        }

        tracing::debug!("Copying {:?} out of the staging directory first", archive);
        let mut copy = NamedTempFile::new().map_err(untouched)?;
        File::open(archive)
            .and_then(|mut f| std::io::copy(&mut f, copy.as_file_mut()))
            .map_err(untouched)?;
        let file = copy.reopen().map_err(untouched)?;
        Ok((BufReader::new(file), Some(copy)))
    }

    /// Closes `store`, imports, then reopens `store` whatever the outcome
    pub fn import_into_store<S: PersistenceStore + ?Sized, R: Read + Seek>(
        &self,
        store: &mut S,
        reader: R,
    ) -> Result<RestoreReport> {
        if let (Some(store_dir), Some(configured)) =
            (store.backing_dir(), self.locations.persistence_store_dir())
        {
            if store_dir != configured {
                tracing::warn!(
                    "Store lives in {:?} but backups restore into {:?}",
                    store_dir,
                    configured
                );
            }
        }

        store
            .close()
            .with_msg("Closing persistence store failed")
            .map_err(|e| e.restore_failed(RestoreReport::default()))?;

        let res = self.import(reader);
        match (res, store.reopen()) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(report), Err(e)) => {
                Err(e.with_msg("Reopening persistence store failed").restore_failed(report))
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(e2)) => {
                tracing::error!("Reopening persistence store failed as well: {e2}");
                Err(e)
            }
        }
    }

    fn is_in_staging(&self, path: &Path) -> bool {
        let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
        canonical(path).starts_with(canonical(self.locations.staging_dir()))
    }

    fn swap_staged(&self) -> Result<RestoreReport> {
        let staging = self.locations.staging_dir();
        let staged_db = staging.join(DATABASE_ARCHIVE_DIR);
        let staged_images = staging.join(IMAGES_ARCHIVE_DIR);

        if !staged_db.is_dir() && !staged_images.is_dir() {
            tracing::info!("Archive holds neither database nor images, nothing to restore");
            return Ok(RestoreReport::default());
        }

        let mut report = RestoreReport::default();
        let res = self
            .swap_database(&staged_db, &mut report)
            .and_then(|_| self.swap_images(&staged_images, &mut report));

        match res {
            Ok(()) => {
                tracing::info!("Backup imported: {:?}", report);
                Ok(report)
            }
            Err(e) => {
                if report.any_replaced() {
                    tracing::error!(
                        "Restore failed after live storage was modified, it may be in a mixed state {:?}: {e}",
                        report
                    );
                } else {
                    tracing::error!("Restore failed, live storage untouched: {e}");
                }
                Err(e.restore_failed(report))
            }
        }
    }

    fn swap_database(&self, staged: &Path, report: &mut RestoreReport) -> Result<()> {
        if !staged.is_dir() {
            tracing::info!("Archive holds no database, keeping the live one");
            return Ok(());
        }
        let Some(live) = self.locations.persistence_store_dir() else {
            tracing::warn!("No persistence store directory configured, database not restored");
            return Ok(());
        };

        let mode = *self.locations.swap_mode();
        report.database_replaced = mode == SwapMode::InPlace;
        let res = swap_into_place(Some(staged), live, SwapStrategy::Overlay, mode);
        mark_replaced_on_rollback_failure(res, &mut report.database_replaced)?;
        report.database_replaced = true;
        remove_dir_if_exists(staged)
    }

    fn swap_images(&self, staged: &Path, report: &mut RestoreReport) -> Result<()> {
        let staged = staged.is_dir().then_some(staged);
        if staged.is_none() {
            tracing::info!("Archive holds no images, clearing the live images");
        }

        let mode = *self.locations.swap_mode();
        report.images_replaced = mode == SwapMode::InPlace;
        let res = swap_into_place(
            staged,
            self.locations.images_dir(),
            SwapStrategy::Replace,
            mode,
        );
        mark_replaced_on_rollback_failure(res, &mut report.images_replaced)?;
        report.images_replaced = true;
        match staged {
            Some(staged) => remove_dir_if_exists(staged),
            None => Ok(()),
        }
    }
}

/// A failed rollback leaves the live folder missing, which counts as replaced.
fn mark_replaced_on_rollback_failure(res: Result<()>, replaced: &mut bool) -> Result<()> {
    if res.as_ref().is_err_and(Error::is_rollback_failure) {
        *replaced = true;
    }
    res
}
