use crate::backup::coordinator::RestoreReport;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::mpsc::SendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error("{0}")]
    ChannelSendError(String),
    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("Archive entry escapes the destination directory: {0:?}")]
    UnsafeEntryName(String),
    #[error("Persistence store is closed")]
    StoreClosed,
    #[error("Backup failed:\n{}", indent::indent_all_with("  ", .0.to_string()))]
    BackupFailed(Box<Error>),
    #[error(
        "Restore failed (database replaced: {}, images replaced: {}):\n{}",
        report.database_replaced,
        report.images_replaced,
        indent::indent_all_with("  ", error.to_string())
    )]
    RestoreFailed {
        report: RestoreReport,
        error: Box<Error>,
    },
    #[error(
        "{:?} was moved aside and could not be put back:\n{}",
        live,
        indent::indent_all_with("  ", error.to_string())
    )]
    RollbackFailed { live: PathBuf, error: Box<Error> },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> WithFnName<S> for Error {
    fn with_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<D: Debug> From<SendError<D>> for Error {
    fn from(value: SendError<D>) -> Self {
        Self::ChannelSendError(format!("Failed to send {:?}", value.0))
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    pub fn backup_failed(self) -> Error {
        match self {
            e @ Error::BackupFailed(_) => e,
            e => Error::BackupFailed(Box::new(e)),
        }
    }

    pub fn restore_failed(self, report: RestoreReport) -> Error {
        match self {
            e @ Error::RestoreFailed { .. } => e,
            e => Error::RestoreFailed {
                report,
                error: Box::new(e),
            },
        }
    }

    /// Live storage was partially overwritten before the failure.
    pub fn is_mixed_state(&self) -> bool {
        self.any(&|e| matches!(e, Error::RestoreFailed { report, .. } if report.any_replaced()))
    }

    /// A live folder was moved aside and could not be put back.
    pub fn is_rollback_failure(&self) -> bool {
        self.any(&|e| matches!(e, Error::RollbackFailed { .. }))
    }

    fn any(&self, pred: &dyn Fn(&Error) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Error::WithMsg { error, .. }
            | Error::WithFnName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. }
            | Error::BackupFailed(error)
            | Error::RestoreFailed { error, .. }
            | Error::RollbackFailed { error, .. } => error.any(pred),
            Error::LotsOfError(errors) => errors.iter().any(|e| e.any(pred)),
            _ => false,
        }
    }
}
