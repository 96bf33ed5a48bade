use std::{
    fs::{File, OpenOptions},
    io::{self, Seek as _, SeekFrom, Write as _},
    path::{Path, PathBuf},
    time::SystemTime,
};

use filetime::FileTime;
use log::*;

use crate::{
    ptp::{ObjectInfo, PtpProtocol},
    session::Session,
    transport::Transport,
    CamResult,
};

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave the existing file untouched and skip the object.
    #[default]
    SkipExisting,
    /// Truncate and replace the existing file.
    Overwrite,
}

/// Successful result of a per-object operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectOutcome {
    Downloaded { path: PathBuf, size: u64 },
    Deleted { filename: String },
    /// The destination exists and overwriting was not requested.
    SkippedExisting { path: PathBuf },
    /// Folders are never transferred or deleted.
    SkippedAssociation,
}

impl ObjectOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedExisting { .. } | Self::SkippedAssociation)
    }
}

/// Opens the destination according to the overwrite policy.
/// Returns `Ok(None)` if the file exists and must be skipped.
fn open_destination(path: &Path, policy: OverwritePolicy) -> io::Result<Option<File>> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);

    match policy {
        OverwritePolicy::SkipExisting => options.create_new(true),
        OverwritePolicy::Overwrite => options.create(true).truncate(true),
    };

    match options.open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copies the camera's timestamps onto the downloaded file: the access time from the
/// modification date, the modification time from the capture date.
fn apply_timestamps(file: &File, info: &ObjectInfo) -> io::Result<()> {
    let to_file_time = |date: Option<chrono::DateTime<chrono::Utc>>| {
        date.map(|d| FileTime::from_system_time(SystemTime::from(d)))
    };

    let atime = to_file_time(info.modification_date);
    let mtime = to_file_time(info.capture_date);

    if atime.is_none() && mtime.is_none() {
        return Ok(());
    }

    filetime::set_file_handle_times(file, atime, mtime)
}

/// Transfers the object into an already opened, empty destination file.
fn transfer_into<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    file: &mut File,
    info: &ObjectInfo,
) -> CamResult<u64> {
    let size = u64::from(info.compressed_size);

    // Reserve the exact size up front, the transfer then fills it in place.
    file.set_len(size)?;

    let mut buf = vec![0u8; info.compressed_size as usize];

    if let Err(e) = session.get_object(info.handle, &mut buf) {
        session.recover(&e);
        return Err(e.into());
    }

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buf)?;
    file.flush()?;

    if let Err(e) = apply_timestamps(file, info) {
        warn!("Could not set timestamps of \"{}\": {e}", info.filename);
    }

    Ok(size)
}

/// Downloads one object to `path`.
///
/// Associations are skipped. With [`OverwritePolicy::SkipExisting`] an existing file
/// yields [`ObjectOutcome::SkippedExisting`] and is left untouched. On a transfer error
/// the stall is recovered and the incomplete file is removed.
pub fn download_object<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    info: &ObjectInfo,
    path: &Path,
    policy: OverwritePolicy,
) -> CamResult<ObjectOutcome> {
    if info.is_association() {
        debug!("Skipping association 0x{:08x}", info.handle);
        return Ok(ObjectOutcome::SkippedAssociation);
    }

    let Some(mut file) = open_destination(path, policy)? else {
        warn!("Skipping file: \"{}\", file exists!", path.display());
        return Ok(ObjectOutcome::SkippedExisting {
            path: path.to_path_buf(),
        });
    };

    info!("Saving file: \"{}\" ({} bytes)", path.display(), info.compressed_size);

    match transfer_into(session, &mut file, info) {
        Ok(size) => {
            info!("\"{}\" is done.", path.display());
            Ok(ObjectOutcome::Downloaded {
                path: path.to_path_buf(),
                size,
            })
        }
        Err(e) => {
            error!("Saving 0x{:08x} to \"{}\" failed: {e}", info.handle, path.display());
            drop(file);
            if let Err(rm) = std::fs::remove_file(path) {
                warn!("Could not remove incomplete file \"{}\": {rm}", path.display());
            }
            Err(e)
        }
    }
}

/// Deletes one object from the camera. Associations are skipped.
pub fn delete_object<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    info: &ObjectInfo,
) -> CamResult<ObjectOutcome> {
    if info.is_association() {
        debug!("Not deleting association 0x{:08x}", info.handle);
        return Ok(ObjectOutcome::SkippedAssociation);
    }

    if let Err(e) = session.delete_object(info.handle) {
        error!("Could not delete object 0x{:08x}: {e}", info.handle);
        session.recover(&e);
        return Err(e.into());
    }

    info!("Object 0x{:08x} ({}) deleted.", info.handle, info.filename);

    Ok(ObjectOutcome::Deleted {
        filename: info.filename.clone(),
    })
}

/// Fetches the object info, stall-recovering on transport errors.
pub(crate) fn fetch_info<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    handle: u32,
) -> CamResult<ObjectInfo> {
    match session.object_info(handle) {
        Ok(info) => Ok(info),
        Err(e) => {
            error!("Handle 0x{handle:08x}: could not get object info: {e}");
            session.recover(&e);
            Err(e.into())
        }
    }
}

/// Downloads a single object by handle into `dir`, under the camera's filename
/// or `filename` if given.
pub fn get_file<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    handle: u32,
    dir: &Path,
    filename: Option<&Path>,
    policy: OverwritePolicy,
) -> CamResult<ObjectOutcome> {
    debug!("Handle: 0x{handle:08x}");

    let info = fetch_info(session, handle)?;
    let path = dir.join(filename.unwrap_or_else(|| Path::new(&info.filename)));

    download_object(session, &info, &path, policy)
}

/// Deletes a single object by handle.
pub fn delete_file<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    handle: u32,
) -> CamResult<ObjectOutcome> {
    let info = fetch_info(session, handle)?;

    delete_object(session, &info)
}
