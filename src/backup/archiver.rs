use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable, ArchiveSource, EntryKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use chrono::{Datelike, Local, Timelike};
use std::fs::File;
use std::io::{BufReader, BufWriter, IntoInnerError, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Writes every source into a single zip archive at `zip_file`
///
/// Sources are written in order. Returns the path of the archive. On error the
/// partially written archive is left in place for the caller to discard.
pub fn zip_all<P: AsRef<Path>>(sources: &[ArchiveSource], zip_file: P) -> Result<PathBuf> {
    let zip_file = zip_file.as_ref();
    let mut writer = File::create(zip_file)
        .map(BufWriter::new)
        .map(ZipWriter::new)
        .map_err(Error::from)
        .with_msg(format!("Creating archive {:?} failed", zip_file))?;

    let mut entry_count = 0;
    for source in sources {
        for entry in source
            .archive_entry_iterator()
            .with_debug_object_and_fn_name(source.clone(), "archive_entry_iterator")?
        {
            append_entry(&mut writer, &entry?)?;
            entry_count += 1;
        }
    }

    writer
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    tracing::info!("Wrote {} archive entries to {:?}", entry_count, zip_file);
    Ok(zip_file.to_path_buf())
}

fn append_entry<W: Write + Seek>(writer: &mut ZipWriter<W>, entry: &ArchiveEntry) -> Result<()> {
    let options = entry_options(&entry.src)?;
    match entry.kind {
        EntryKind::Directory => {
            writer.add_directory(entry.dst.to_string(), options)?;
        }
        EntryKind::File => {
            let mut reader = File::open(&entry.src)
                .map(BufReader::new)
                .map_err(Error::from)
                .with_msg(format!("Opening {:?} failed", entry.src))?;
            writer.start_file(entry.dst.to_string(), options)?;
            std::io::copy(&mut reader, writer)
                .map_err(Error::from)
                .with_msg(format!("Reading {:?} failed", entry.src))?;
        }
    }
    tracing::trace!("Appended {:?}", entry.dst);
    Ok(())
}

fn entry_options(src: &Path) -> Result<SimpleFileOptions> {
    let modified = std::fs::metadata(src)
        .and_then(|md| md.modified())
        .map_err(Error::from)
        .with_msg(format!("Reading metadata of {:?} failed", src))?;

    Ok(SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(to_zip_date_time(modified)))
}

/// Zip timestamps only cover 1980..=2107; anything outside clamps to the format's epoch.
fn to_zip_date_time(time: SystemTime) -> zip::DateTime {
    let local = chrono::DateTime::<Local>::from(time);
    u16::try_from(local.year())
        .ok()
        .and_then(|year| {
            zip::DateTime::from_date_and_time(
                year,
                local.month() as u8,
                local.day() as u8,
                local.hour() as u8,
                local.minute() as u8,
                local.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}
