use std::time::Duration;

use log::*;
use nusb::transfer::{Control, RequestBuffer};

use crate::{
    consts::{self, usb::CLASS_HUB, usb::CLASS_PTP},
    endpoints::EndpointSet,
    ptp::PtpProtocol,
    session::{Session, SessionConfig},
    transport::{Transport, TransportError},
    CamError, CamResult,
};

/// A USB device that looks like a camera.
///
/// Discovered once per operation, never cached across operations.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    info: nusb::DeviceInfo,
}

impl DeviceHandle {
    pub fn bus_number(&self) -> u8 {
        self.info.bus_number()
    }

    pub fn device_address(&self) -> u8 {
        self.info.device_address()
    }

    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    pub fn product(&self) -> Option<&str> {
        self.info.product_string()
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.info.manufacturer_string()
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:03}/{:03} {:04X}:{:04X}",
            self.bus_number(),
            self.device_address(),
            self.vendor_id(),
            self.product_id()
        )
    }
}

/// Decides whether a device should be talked to.
///
/// Hubs are never cameras. Other devices qualify if their first interface has the
/// still image class, or unconditionally when `force` is set.
pub fn is_camera_candidate(device_class: u8, first_interface_class: Option<u8>, force: bool) -> bool {
    device_class != CLASS_HUB && (force || first_interface_class == Some(CLASS_PTP))
}

/// Matches a device location against the requested bus/device numbers.
/// Zero acts as a wildcard for either number.
pub fn matches_location(bus: u8, dev: u8, wanted_bus: u8, wanted_dev: u8) -> bool {
    (wanted_bus == 0 || bus == wanted_bus) && (wanted_dev == 0 || dev == wanted_dev)
}

/// Lists all connected PTP devices (or every non-hub device when `force` is set).
pub fn list_devices(force: bool) -> CamResult<Vec<DeviceHandle>> {
    let devices = nusb::list_devices()?
        .filter(|info| {
            let first_class = info.interfaces().next().map(|iface| iface.class());
            is_camera_candidate(info.class(), first_class, force)
        })
        .map(|info| DeviceHandle { info })
        .collect::<Vec<_>>();

    debug!("Found {} candidate device(s)", devices.len());

    Ok(devices)
}

/// Finds the first device matching the given bus and device numbers (0 matches any).
pub fn find_device(bus: u8, dev: u8, force: bool) -> CamResult<DeviceHandle> {
    list_devices(force)?
        .into_iter()
        .find(|d| matches_location(d.bus_number(), d.device_address(), bus, dev))
        .ok_or(CamError::NoDeviceFound { bus, dev })
}

/// A device together with the model it reported, if a session could be opened.
#[derive(Debug, Clone)]
pub struct Probed<H> {
    pub device: H,
    pub model: Option<String>,
}

/// Opens a short-lived session on each device and asks it for its model.
///
/// A device that refuses the session or the device info query is still listed, without a
/// model. Each session is closed before the next device is opened.
pub fn probe_sessions<H, T, P>(
    devices: impl IntoIterator<Item = H>,
    mut open: impl FnMut(&H) -> CamResult<Session<T, P>>,
) -> Vec<Probed<H>>
where
    H: std::fmt::Display,
    T: Transport,
    P: PtpProtocol,
{
    devices
        .into_iter()
        .map(|device| {
            let model = open(&device)
                .and_then(|mut session| Ok(session.device_info()?))
                .map(|info| info.model)
                .inspect_err(|e| warn!("Could not query {device}: {e}. Try to reset the camera."))
                .ok();

            Probed { device, model }
        })
        .collect()
}

/// Lists devices and probes each one for its model, see [`probe_sessions`].
pub fn probe_devices<P: PtpProtocol>(
    force: bool,
    config: SessionConfig,
    mut new_protocol: impl FnMut() -> P,
) -> CamResult<Vec<Probed<DeviceHandle>>> {
    let probed = probe_sessions(list_devices(force)?, |handle| {
        Session::open_device(handle, new_protocol(), config)
    });

    if probed.is_empty() {
        info!("Found no PTP devices");
    }

    Ok(probed)
}

/// [`Transport`] over a claimed nusb interface.
///
/// nusb transfers are futures. Each call is driven to completion on a private
/// current-thread runtime under `tokio::time::timeout`, so the transport behaves
/// like a blocking USB API.
pub struct UsbTransport {
    interface: Option<nusb::Interface>,
    device: Option<nusb::Device>,
    endpoints: EndpointSet,
    runtime: tokio::runtime::Runtime,
}

impl UsbTransport {
    /// Opens the device, resolves the endpoints of its first interface and claims it.
    pub fn open(handle: &DeviceHandle) -> CamResult<Self> {
        let device = handle.info.open()?;

        let (interface_number, endpoints) = {
            let config = device
                .active_configuration()
                .map_err(|e| CamError::Configuration(e.to_string()))?;

            let group = config
                .interfaces()
                .next()
                .ok_or_else(|| CamError::Configuration("no interface descriptor".to_string()))?;

            let alt = group
                .alt_settings()
                .next()
                .ok_or_else(|| CamError::Configuration("no alternate setting".to_string()))?;

            (alt.interface_number(), EndpointSet::from_alt_setting(&alt))
        };

        if !endpoints.is_complete() {
            warn!("Device {handle} is missing PTP endpoints: {endpoints:?}");
        }

        let interface = device.claim_interface(interface_number)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        info!("Claimed interface {interface_number} of {handle}");

        Ok(Self {
            interface: Some(interface),
            device: Some(device),
            endpoints,
            runtime,
        })
    }

    fn interface(&self) -> Result<&nusb::Interface, TransportError> {
        self.interface.as_ref().ok_or(TransportError::Released)
    }
}

fn copy_into(buf: &mut [u8], data: &[u8]) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    n
}

impl Transport for UsbTransport {
    fn endpoints(&self) -> EndpointSet {
        self.endpoints
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let interface = self.interface()?;

        let data = self
            .runtime
            .block_on(tokio::time::timeout(
                timeout,
                interface.bulk_in(endpoint, RequestBuffer::new(buf.len())),
            ))?
            .into_result()?;

        Ok(copy_into(buf, &data))
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let interface = self.interface()?;

        let res = self
            .runtime
            .block_on(tokio::time::timeout(
                timeout,
                interface.bulk_out(endpoint, data.to_vec()),
            ))?
            .into_result()?;

        Ok(res.actual_length())
    }

    fn read_interrupt(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let interface = self.interface()?;

        let data = self
            .runtime
            .block_on(tokio::time::timeout(
                timeout,
                interface.interrupt_in(endpoint, RequestBuffer::new(buf.len())),
            ))?
            .into_result()?;

        Ok(copy_into(buf, &data))
    }

    fn control_in(&mut self, control: Control, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self
            .interface()?
            .control_in_blocking(control, buf, consts::CONTROL_TIMEOUT)?)
    }

    fn control_out(&mut self, control: Control, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self
            .interface()?
            .control_out_blocking(control, data, consts::CONTROL_TIMEOUT)?)
    }

    fn release(&mut self) {
        if let Some(interface) = self.interface.take() {
            debug!("Releasing interface {}", interface.interface_number());
            drop(interface);
        }

        if self.device.take().is_some() {
            debug!("USB device closed");
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}
