//! The capture workflow.
//!
//! One trigger walks `Idle -> Capturing -> AwaitingEvent -> (ObjectAdded)* -> Complete | Failed`:
//! the capture command is sent, then events are read from the interrupt endpoint until
//! `CaptureComplete`. The last announced object is downloaded and, in loop mode, deleted.

use std::path::{Path, PathBuf};

use log::*;

use crate::{
    download::{self, ObjectOutcome, OverwritePolicy},
    ptp::{EventCode, PtpProtocol},
    session::Session,
    transport::Transport,
    CamError, CamResult,
};

/// States of one capture trigger.
#[derive(Debug)]
pub enum CaptureState {
    Idle,
    Capturing,
    AwaitingEvent,
    /// At least one object was announced; holds the most recent handle.
    ObjectAdded(u32),
    Complete(CaptureOutcome),
    Failed(CamError),
}

/// How the event sequence of one trigger ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// `CaptureComplete` after one or more `ObjectAdded`.
    /// `handle` is the last announced object, `announced` all of them in order.
    Captured { handle: u32, announced: Vec<u32> },
    /// `CaptureComplete` arrived but no object was announced.
    StatusUnknown,
    /// The first event after the capture command was neither `ObjectAdded` nor
    /// `CaptureComplete`. Once an object is announced, other events are skipped.
    UnexpectedEvent { code: u16 },
}

/// Where and how captured objects are saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Destination directory; files keep the camera's filename.
    pub dir: PathBuf,
    pub policy: OverwritePolicy,
}

impl CaptureOptions {
    pub fn new(dir: impl AsRef<Path>, policy: OverwritePolicy) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            policy,
        }
    }
}

/// Result of one trigger including its download and optional deletion.
#[derive(Debug)]
pub struct TriggerReport {
    pub outcome: CaptureOutcome,
    /// `None` when there was nothing to download.
    pub download: Option<CamResult<ObjectOutcome>>,
    /// Only set in loop mode, after a successful download.
    pub deletion: Option<CamResult<ObjectOutcome>>,
}

impl TriggerReport {
    fn without_download(outcome: CaptureOutcome) -> Self {
        Self {
            outcome,
            download: None,
            deletion: None,
        }
    }

    pub fn downloaded(&self) -> bool {
        matches!(self.download, Some(Ok(ObjectOutcome::Downloaded { .. })))
    }
}

/// Aggregate of a loop capture.
#[derive(Debug, Default)]
pub struct LoopCaptureReport {
    pub triggers: Vec<TriggerReport>,
    /// Set when the loop stopped early: the capture command or an event read failed.
    pub aborted: Option<CamError>,
}

impl LoopCaptureReport {
    pub fn downloaded(&self) -> usize {
        self.triggers.iter().filter(|t| t.downloaded()).count()
    }

    pub fn deleted(&self) -> usize {
        self.triggers
            .iter()
            .filter(|t| matches!(t.deletion, Some(Ok(ObjectOutcome::Deleted { .. }))))
            .count()
    }
}

/// Reads the next event and decides the following state.
fn await_event<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    last_handle: Option<u32>,
    announced: &mut Vec<u32>,
) -> CaptureState {
    let event = match session.wait_event() {
        Ok(event) => event,
        Err(e) => {
            error!("Events receiving error. Capture status unknown. ({e})");
            session.recover(&e);
            return CaptureState::Failed(e.into());
        }
    };

    debug!("Event received 0x{:04x} {:?}", event.code, event.params);

    match (event.kind(), last_handle) {
        (Some(EventCode::ObjectAdded), _) => {
            let handle = event.param1().unwrap_or_default();
            info!("Object added 0x{handle:08x}");
            announced.push(handle);
            CaptureState::ObjectAdded(handle)
        }
        (Some(EventCode::CaptureComplete), Some(handle)) => {
            info!("Capture completed successfully!");
            CaptureState::Complete(CaptureOutcome::Captured {
                handle,
                announced: std::mem::take(announced),
            })
        }
        (Some(EventCode::CaptureComplete), None) => {
            warn!("Camera reported 'capture completed' but the object information is missing.");
            CaptureState::Complete(CaptureOutcome::StatusUnknown)
        }
        (_, Some(handle)) => {
            debug!("Ignoring event 0x{:04x} while waiting for capture completion", event.code);
            CaptureState::ObjectAdded(handle)
        }
        (_, None) => {
            warn!("Unexpected event 0x{:04x} during capture. Capture status unknown.", event.code);
            CaptureState::Complete(CaptureOutcome::UnexpectedEvent { code: event.code })
        }
    }
}

/// Runs the event state machine of one trigger.
///
/// Returns an error only from the `Failed` state: the capture command was refused or an
/// event could not be read. The session's current timeout applies to every event wait.
pub fn run_trigger<T: Transport, P: PtpProtocol>(session: &mut Session<T, P>) -> CamResult<CaptureOutcome> {
    let mut state = CaptureState::Idle;
    let mut announced = Vec::new();

    loop {
        trace!("Capture state: {state:?}");

        state = match state {
            CaptureState::Idle => {
                info!("Initiating capture...");
                CaptureState::Capturing
            }
            CaptureState::Capturing => match session.initiate_capture() {
                Ok(()) => CaptureState::AwaitingEvent,
                Err(e) => {
                    error!("Could not capture: {e}");
                    session.recover(&e);
                    CaptureState::Failed(e.into())
                }
            },
            CaptureState::AwaitingEvent => await_event(session, None, &mut announced),
            CaptureState::ObjectAdded(handle) => await_event(session, Some(handle), &mut announced),
            CaptureState::Complete(outcome) => return Ok(outcome),
            CaptureState::Failed(e) => return Err(e),
        };
    }
}

/// Runs one trigger, then downloads the captured object and, if `delete_after`, removes it
/// from the camera. Download and deletion failures are recorded in the report.
fn trigger_and_fetch<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    options: &CaptureOptions,
    delete_after: bool,
) -> CamResult<TriggerReport> {
    let outcome = run_trigger(session)?;

    let CaptureOutcome::Captured { handle, announced } = outcome.clone() else {
        return Ok(TriggerReport::without_download(outcome));
    };

    if announced.len() > 1 {
        warn!(
            "Camera announced {} objects, only the last one (0x{handle:08x}) is downloaded",
            announced.len()
        );
    }

    debug!("Downloading: 0x{handle:08x}");

    let info = match download::fetch_info(session, handle) {
        Ok(info) => info,
        Err(e) => {
            return Ok(TriggerReport {
                outcome,
                download: Some(Err(e)),
                deletion: None,
            });
        }
    };

    let path = options.dir.join(&info.filename);
    let download = download::download_object(session, &info, &path, options.policy);

    let deletion = match &download {
        Ok(ObjectOutcome::Downloaded { .. }) if delete_after => {
            info!("Deleting 0x{handle:08x} from camera.");
            Some(download::delete_object(session, &info))
        }
        _ => None,
    };

    Ok(TriggerReport {
        outcome,
        download: Some(download),
        deletion,
    })
}

/// Captures one picture and downloads it. The object stays on the camera.
///
/// The capture timeout from the session config applies until this returns.
pub fn capture<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    options: &CaptureOptions,
) -> CamResult<TriggerReport> {
    let capture_timeout = session.config().capture_timeout;
    let mut session = session.override_timeout(capture_timeout);

    trigger_and_fetch(&mut *session, options, false)
}

/// Captures `count` pictures in sequence, downloading and deleting each from the camera.
///
/// A failed download or deletion only affects its own trigger. A refused capture command
/// or an event read error stops the loop; the error is kept in the report.
pub fn loop_capture<T: Transport, P: PtpProtocol>(
    session: &mut Session<T, P>,
    count: u32,
    options: &CaptureOptions,
) -> CamResult<LoopCaptureReport> {
    let capture_timeout = session.config().capture_timeout;
    let mut session = session.override_timeout(capture_timeout);

    let device_info = session
        .device_info()
        .inspect_err(|e| error!("Could not get device info: {e}"))
        .inspect_err(|e| session.recover(e))?;
    info!("Camera: {}", device_info.model);

    let mut report = LoopCaptureReport::default();

    for round in 1..=count {
        debug!("Capture {round}/{count}");

        match trigger_and_fetch(&mut *session, options, true) {
            Ok(trigger) => report.triggers.push(trigger),
            Err(e) => {
                report.aborted = Some(e);
                break;
            }
        }
    }

    info!(
        "{} capture(s) done, {} downloaded, {} deleted",
        report.triggers.len(),
        report.downloaded(),
        report.deleted()
    );

    Ok(report)
}
