use log::*;
use nusb::transfer::{Control, ControlType, Recipient};

use crate::{
    consts::usb::{FEATURE_HALT, REQ_CLEAR_FEATURE, REQ_GET_STATUS},
    endpoints::Endpoint,
    transport::Transport,
};

/// What happened to one endpoint during stall recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// The endpoint was not halted.
    Clear,
    /// The endpoint was halted and CLEAR_FEATURE(HALT) succeeded.
    Reset,
    /// GET_STATUS failed, the endpoint was left alone.
    QueryFailed,
    /// The endpoint was halted and CLEAR_FEATURE(HALT) failed.
    ResetFailed,
    /// The endpoint was never resolved.
    Skipped,
}

/// Outcome of a stall recovery pass, one entry per endpoint examined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StallReport {
    pub pipes: Vec<(Endpoint, PipeStatus)>,
}

impl StallReport {
    pub fn reset_count(&self) -> usize {
        self.pipes.iter().filter(|(_, s)| *s == PipeStatus::Reset).count()
    }

    pub fn failure_count(&self) -> usize {
        self.pipes
            .iter()
            .filter(|(_, s)| matches!(s, PipeStatus::QueryFailed | PipeStatus::ResetFailed))
            .count()
    }
}

fn endpoint_status_request(endpoint: Endpoint) -> Control {
    Control {
        control_type: ControlType::Standard,
        recipient: Recipient::Endpoint,
        request: REQ_GET_STATUS,
        value: FEATURE_HALT,
        index: endpoint.address().into(),
    }
}

fn clear_halt_request(endpoint: Endpoint) -> Control {
    Control {
        control_type: ControlType::Standard,
        recipient: Recipient::Endpoint,
        request: REQ_CLEAR_FEATURE,
        value: FEATURE_HALT,
        index: endpoint.address().into(),
    }
}

/// Queries the halt status of one endpoint and clears it if set.
/// Failures are logged and reported in the returned status.
pub fn reset_pipe<T: Transport + ?Sized>(transport: &mut T, endpoint: Endpoint) -> PipeStatus {
    if !endpoint.is_resolved() {
        debug!("Not checking unresolved endpoint ({endpoint})");
        return PipeStatus::Skipped;
    }

    let mut status = [0u8; 2];
    if let Err(e) = transport.control_in(endpoint_status_request(endpoint), &mut status) {
        warn!("{endpoint}: could not get endpoint status ({e})");
        return PipeStatus::QueryFailed;
    }

    if u16::from_le_bytes(status) == 0 {
        return PipeStatus::Clear;
    }

    info!("Resetting halted {endpoint}");

    match transport.control_out(clear_halt_request(endpoint), &[]) {
        Ok(_) => PipeStatus::Reset,
        Err(e) => {
            warn!("{endpoint}: could not clear halt feature ({e})");
            PipeStatus::ResetFailed
        }
    }
}

/// Clears a halt condition on the bulk-in and bulk-out endpoints.
///
/// Never fails: control transfer errors are logged and recorded in the report only.
pub fn clear_stall<T: Transport + ?Sized>(transport: &mut T) -> StallReport {
    let endpoints = transport.endpoints();

    let pipes = [endpoints.bulk_in, endpoints.bulk_out]
        .into_iter()
        .map(|endpoint| (endpoint, reset_pipe(transport, endpoint)))
        .collect();

    StallReport { pipes }
}
