use std::path::Path;

use log::*;

use crate::{
    download::{self, ObjectOutcome, OverwritePolicy},
    ptp::{ObjectInfo, PtpProtocol},
    session::Session,
    transport::Transport,
    CamError, CamResult,
};

/// Per-object results of a batch operation, in handle order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(u32, CamResult<ObjectOutcome>)>,
}

impl BatchReport {
    /// Number of handles visited.
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Downloaded { .. }))
    }

    pub fn deleted(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Deleted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(ObjectOutcome::is_skipped)
    }

    pub fn errors(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// Handles whose operation failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (u32, &CamError)> {
        self.results
            .iter()
            .filter_map(|(handle, r)| r.as_ref().err().map(|e| (*handle, e)))
    }

    fn count(&self, pred: impl Fn(&ObjectOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| r.as_ref().is_ok_and(&pred))
            .count()
    }
}

/// Applies `op` to every object on the camera.
///
/// Handles are listed once; failing to list them is the only error returned. For each
/// handle the object info is fetched: a failure there is recorded (after stall recovery
/// on transport errors) and the batch moves on. Associations are recorded as skipped and
/// never reach `op`. Errors from `op` are recorded per handle as well.
pub fn for_each_object<T, P, F>(session: &mut Session<T, P>, mut op: F) -> CamResult<BatchReport>
where
    T: Transport,
    P: PtpProtocol,
    F: FnMut(&mut Session<T, P>, &ObjectInfo) -> CamResult<ObjectOutcome>,
{
    let handles = session
        .object_handles()
        .inspect_err(|e| error!("Could not get object handles: {e}"))
        .inspect_err(|e| session.recover(e))?;

    debug!("{} object(s) on the camera", handles.len());

    let mut report = BatchReport::default();

    for handle in handles {
        debug!("Handle: 0x{handle:08x}");

        let result = download::fetch_info(session, handle).and_then(|info| {
            if info.is_association() {
                Ok(ObjectOutcome::SkippedAssociation)
            } else {
                op(session, &info)
            }
        });

        report.results.push((handle, result));
    }

    Ok(report)
}

fn log_camera<T: Transport, P: PtpProtocol>(session: &mut Session<T, P>) -> CamResult<()> {
    let info = session
        .device_info()
        .inspect_err(|e| error!("Could not get device info: {e}"))
        .inspect_err(|e| session.recover(e))?;
    info!("Camera: {}", info.model);
    Ok(())
}

/// Downloads every object into `dir`, keeping the camera's filenames.
pub fn download_all<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    dir: &Path,
    policy: OverwritePolicy,
) -> CamResult<BatchReport> {
    log_camera(session)?;

    let report = for_each_object(session, |session, info| {
        download::download_object(session, info, &dir.join(&info.filename), policy)
    })?;

    info!(
        "{} object(s) processed: {} downloaded, {} skipped, {} failed",
        report.processed(),
        report.downloaded(),
        report.skipped(),
        report.errors()
    );

    Ok(report)
}

/// Deletes every object from the camera. Folders are left in place.
pub fn delete_all<T: Transport, P: PtpProtocol>(session: &mut Session<T, P>) -> CamResult<BatchReport> {
    log_camera(session)?;

    let report = for_each_object(session, download::delete_object)?;

    info!(
        "{} object(s) processed: {} deleted, {} skipped, {} failed",
        report.processed(),
        report.deleted(),
        report.skipped(),
        report.errors()
    );

    Ok(report)
}
