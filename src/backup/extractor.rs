use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Unpacks every entry of the archive in `reader` below `destination`
///
/// Entries are processed in archive order. Directory entries are created with
/// their parents, file entries are streamed into new files. Existing unrelated
/// files in `destination` are left alone. On error `destination` may be
/// partially populated. Returns the number of entries extracted.
pub fn extract_all<R: Read + Seek, P: AsRef<Path>>(reader: R, destination: P) -> Result<usize> {
    let destination = destination.as_ref();
    let mut archive = ZipArchive::new(reader)
        .map_err(Error::from)
        .with_msg("Opening archive failed")?;
    std::fs::create_dir_all(destination)?;

    let total = archive.len();
    tracing::info!("Extracting {} entries into {:?}", total, destination);

    for i in 0..total {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            tracing::error!("Refusing archive entry outside destination: {:?}", name);
            return Err(Error::UnsafeEntryName(name));
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            tracing::trace!("Creating directory {:?}", target);
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .map(BufWriter::new)
            .map_err(Error::from)
            .with_msg(format!("Creating {:?} failed", target))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(Error::from)
            .with_msg(format!("Extracting {:?} failed", name))?;
        out.into_inner().map_err(IntoInnerError::into_error)?;
        tracing::trace!("Extracted {:?}", target);
    }

    Ok(total)
}
