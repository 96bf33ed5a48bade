use log::*;
use nusb::transfer::{Control, ControlType, Recipient};

use crate::{
    consts::usb::{REQ_DEVICE_RESET, REQ_GET_DEVICE_STATUS},
    ptp::ResponseCode,
    stall::{self, PipeStatus},
    transport::Transport,
    usb::{DeviceHandle, UsbTransport},
    CamResult,
};

/// What a device reset observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Halt status handling of bulk-in, bulk-out and interrupt-in, in that order.
    pub pipes: Vec<PipeStatus>,
    /// Device status read after the pipes were cleared, `None` if the request failed.
    pub status: Option<ResponseCode>,
    /// Whether the DEVICE_RESET class request was accepted.
    pub reset_accepted: bool,
}

impl ResetReport {
    pub fn status_ok(&self) -> bool {
        self.status.is_some_and(ResponseCode::is_ok)
    }
}

fn class_request(request: u8) -> Control {
    Control {
        control_type: ControlType::Class,
        recipient: Recipient::Interface,
        request,
        value: 0,
        index: 0,
    }
}

/// Reads the PTP device status. The reply is a 16-bit length followed by the response code.
fn device_status<T: Transport + ?Sized>(transport: &mut T) -> Option<ResponseCode> {
    let mut buf = [0u8; 4];

    match transport.control_in(class_request(REQ_GET_DEVICE_STATUS), &mut buf) {
        Ok(n) if n >= 4 => Some(ResponseCode(u16::from_le_bytes([buf[2], buf[3]]))),
        Ok(n) => {
            warn!("Short device status reply ({n} bytes)");
            None
        }
        Err(e) => {
            warn!("Could not get device status ({e})");
            None
        }
    }
}

/// Resets a camera without opening a PTP session.
///
/// Clears halted pipes, reports the device status, then issues the class reset which also
/// drops any session left open by a previous client. Control failures are only logged.
/// The transport is released afterwards.
pub fn reset_device<T: Transport + ?Sized>(transport: &mut T) -> ResetReport {
    // Cameras expect a status request first, the answer does not matter yet.
    let _ = device_status(transport);

    let endpoints = transport.endpoints();
    let pipes = [endpoints.bulk_in, endpoints.bulk_out, endpoints.interrupt_in]
        .into_iter()
        .map(|endpoint| stall::reset_pipe(transport, endpoint))
        .collect();

    let status = device_status(transport);
    match status {
        Some(code) if code.is_ok() => info!("Device status OK"),
        Some(code) => info!("Device status 0x{:04x}", code.0),
        None => {}
    }

    let reset_accepted = transport
        .control_out(class_request(REQ_DEVICE_RESET), &[])
        .inspect_err(|e| error!("Device reset failed: {e}"))
        .is_ok();

    let _ = device_status(transport);

    transport.release();

    ResetReport {
        pipes,
        status,
        reset_accepted,
    }
}

/// Opens the device and resets it, see [`reset_device`].
pub fn reset(handle: &DeviceHandle) -> CamResult<ResetReport> {
    let mut transport = UsbTransport::open(handle)?;

    info!("Resetting {handle}");

    Ok(reset_device(&mut transport))
}
