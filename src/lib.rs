//! # hungry_backup
//!
//! Whole-app backup and restore for HungryApp's local data: the recipe
//! database plus the recipe images folder, packed into a single zip file.
//!
//! ## Features
//!
//! - **Export**: zips the images tree (minus scratch `tmp` images) and the
//!   database directory into `<staging>/<base name>_<yyyy-MM-dd>.zip`
//! - **Import**: extracts into staging first, then swaps the database and
//!   images into place, leaving live data untouched on a corrupt archive
//! - **Background worker**: serialized export/import jobs with completion events
//!
//! ## Quick Start
//!
//! ```no_run
//! use hungry_backup::backup::coordinator::BackupCoordinator;
//! use hungry_backup::backup::storage::StorageLocations;
//!
//! let coordinator = BackupCoordinator::new(StorageLocations::under_app_files("/data/hungryapp/files"));
//! let bundle = coordinator.request_backup()?;
//! let report = coordinator.import_file(bundle.path())?;
//! assert!(report.images_replaced);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
