//! Swap phase of a restore: puts a staged folder in place of a live one.

use crate::backup::dir_ops::{copy_dir_recursively, ensure_clean_dir, remove_dir_if_exists};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::storage::SwapMode;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapStrategy {
    /// Staged files overwrite live ones; live files missing from the backup survive.
    Overlay,
    /// The live folder ends up holding exactly the staged files (or nothing).
    Replace,
}

pub fn swap_into_place(
    staged: Option<&Path>,
    live: &Path,
    strategy: SwapStrategy,
    mode: SwapMode,
) -> Result<()> {
    tracing::info!(
        "Swapping {:?} into {:?} ({:?}, {:?})",
        staged,
        live,
        strategy,
        mode
    );
    let res = match mode {
        SwapMode::InPlace => swap_in_place(staged, live, strategy),
        SwapMode::Shadow => swap_with_shadow(staged, live, strategy),
    };
    res.with_msg(format!("Swapping into {:?} failed", live))
}

fn swap_in_place(staged: Option<&Path>, live: &Path, strategy: SwapStrategy) -> Result<()> {
    match strategy {
        SwapStrategy::Overlay => fs::create_dir_all(live)?,
        SwapStrategy::Replace => ensure_clean_dir(live)?,
    }
    if let Some(staged) = staged {
        copy_dir_recursively(staged, live)?;
    }
    Ok(())
}

fn swap_with_shadow(staged: Option<&Path>, live: &Path, strategy: SwapStrategy) -> Result<()> {
    swap_with_shadow_using(staged, live, strategy, |from, to| fs::rename(from, to))
}

/// Shadow swap with the rename step supplied by the caller.
///
/// When the live folder was moved aside and can neither be replaced nor put
/// back, the error is [`Error::RollbackFailed`]: `live` no longer exists and
/// both the shadow and the previous folder are left on disk.
fn swap_with_shadow_using<F>(
    staged: Option<&Path>,
    live: &Path,
    strategy: SwapStrategy,
    rename: F,
) -> Result<()>
where
    F: Fn(&Path, &Path) -> std::io::Result<()>,
{
    let shadow = sibling(live, "restore")?;
    let previous = sibling(live, "previous")?;
    remove_dir_if_exists(&shadow)?;
    remove_dir_if_exists(&previous)?;

    if let Err(e) = build_shadow(staged, live, &shadow, strategy) {
        return Err(discard_shadow(e, &shadow));
    }

    let had_live = live.exists();
    if had_live {
        if let Err(e) = rename(live, &previous) {
            return Err(discard_shadow(
                Error::from(e).with_msg(format!("Moving {:?} aside failed", live)),
                &shadow,
            ));
        }
    }

    if let Err(e) = rename(&shadow, live) {
        let error = Error::from(e).with_msg(format!("Moving {:?} into place failed", shadow));
        if !had_live {
            return Err(discard_shadow(error, &shadow));
        }
        return Err(match rename(&previous, live) {
            Ok(()) => discard_shadow(error, &shadow),
            Err(e2) => {
                tracing::error!("Could not put {:?} back at {:?}: {}", previous, live, e2);
                Error::RollbackFailed {
                    live: live.to_path_buf(),
                    error: Box::new(error.chain(Error::from(e2))),
                }
            }
        });
    }

    if had_live {
        if let Err(e) = remove_dir_if_exists(&previous) {
            tracing::warn!("Leaving stale {:?} behind: {}", previous, e);
        }
    }
    Ok(())
}

fn build_shadow(
    staged: Option<&Path>,
    live: &Path,
    shadow: &Path,
    strategy: SwapStrategy,
) -> Result<()> {
    fs::create_dir_all(shadow)?;
    if strategy == SwapStrategy::Overlay && live.is_dir() {
        copy_dir_recursively(live, shadow)?;
    }
    if let Some(staged) = staged {
        copy_dir_recursively(staged, shadow)?;
    }
    Ok(())
}

fn discard_shadow(error: Error, shadow: &Path) -> Error {
    match remove_dir_if_exists(shadow) {
        Ok(()) => error,
        Err(e) => error.chain(e),
    }
}

/// Hidden sibling of `live`, on the same filesystem so a rename can replace it.
fn sibling(live: &Path, suffix: &str) -> Result<PathBuf> {
    let invalid = || {
        Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{:?} has no parent directory or file name", live),
        ))
    };
    let name = live
        .file_name()
        .ok_or_else(invalid)?
        .to_str()
        .ok_or_else(|| Error::NonUtf8Path(live.to_path_buf()))?;
    let parent = live.parent().ok_or_else(invalid)?;
    Ok(parent.join(format!(".{name}.{suffix}")))
}
