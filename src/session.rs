use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use log::*;

use crate::{
    consts,
    endpoints::EndpointSet,
    ptp::{
        ByteOrder, CaptureEvent, DeviceInfo, DevicePropDesc, ObjectInfo, PropValue, PtpError, PtpIo,
        PtpProtocol, PtpResult,
    },
    stall::{self, StallReport},
    transport::{self, Transport, TransportError},
    usb::{self, UsbTransport},
    CamError, CamResult,
};

/// Tunables of a session. `Default` gives the values from [`consts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Timeout of every bulk and interrupt transfer.
    pub timeout: Duration,
    /// Timeout applied for the duration of capture operations.
    pub capture_timeout: Duration,
    /// Largest single bulk read request.
    pub transfer_budget: usize,
    pub session_id: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: consts::DEFAULT_TIMEOUT,
            capture_timeout: consts::CAPTURE_TIMEOUT,
            transfer_budget: consts::TRANSFER_BUDGET,
            session_id: consts::DEFAULT_SESSION_ID,
        }
    }
}

/// The transport side of a session, handed to the PTP command layer as [`PtpIo`].
pub struct PtpLink<T: Transport> {
    transport: T,
    endpoints: EndpointSet,
    transaction_id: u32,
    byte_order: ByteOrder,
    timeout: Duration,
    transfer_budget: usize,
}

impl<T: Transport> PtpLink<T> {
    fn new(transport: T, config: &SessionConfig) -> Self {
        let endpoints = transport.endpoints();

        Self {
            transport,
            endpoints,
            transaction_id: 0,
            byte_order: ByteOrder::LittleEndian,
            timeout: config.timeout,
            transfer_budget: config.transfer_budget,
        }
    }

    /// Clears halted bulk endpoints, then releases the interface.
    fn shutdown(&mut self) {
        stall::clear_stall(&mut self.transport);
        self.transport.release();
    }
}

impl<T: Transport> PtpIo for PtpLink<T> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        transport::bulk_write(&mut self.transport, self.endpoints.bulk_out, data, self.timeout)
    }

    fn read(&mut self, dest: &mut [u8]) -> Result<(), TransportError> {
        transport::bulk_read(
            &mut self.transport,
            self.endpoints.bulk_in,
            dest,
            self.transfer_budget,
            self.timeout,
        )
    }

    fn check_int(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        transport::interrupt_poll(&mut self.transport, self.endpoints.interrupt_in, buf, self.timeout)
    }

    fn next_transaction_id(&mut self) -> u32 {
        let id = self.transaction_id;
        self.transaction_id = self.transaction_id.wrapping_add(1);
        id
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

/// An open PTP session on a claimed USB interface.
///
/// Dropping the session closes it: the PTP session is closed (failures are logged),
/// halted bulk endpoints are cleared and the interface is released. This happens exactly
/// once, on every exit path.
pub struct Session<T: Transport, P: PtpProtocol> {
    link: PtpLink<T>,
    protocol: P,
    config: SessionConfig,
    open: bool,
}

impl<P: PtpProtocol> Session<UsbTransport, P> {
    /// Finds the device at the given bus/device numbers (0 matches any), claims its
    /// interface and opens a PTP session.
    pub fn connect(bus: u8, dev: u8, force: bool, protocol: P, config: SessionConfig) -> CamResult<Self> {
        let handle = usb::find_device(bus, dev, force)?;

        Self::open_device(&handle, protocol, config)
    }

    /// Claims the interface of a discovered device and opens a PTP session on it.
    pub fn open_device(handle: &usb::DeviceHandle, protocol: P, config: SessionConfig) -> CamResult<Self> {
        let transport = UsbTransport::open(handle)?;

        Self::open(transport, protocol, config)
    }
}

impl<T: Transport, P: PtpProtocol> Session<T, P> {
    /// Opens a PTP session over an opened transport.
    ///
    /// If the camera refuses the session, the transport is shut down (stall recovery and
    /// release) and [`CamError::SessionOpen`] is returned. Nothing else should be attempted
    /// on that device.
    pub fn open(transport: T, mut protocol: P, config: SessionConfig) -> CamResult<Self> {
        let mut link = PtpLink::new(transport, &config);

        debug!("Opening session {} on {:?}", config.session_id, link.endpoints);

        if let Err(e) = protocol.open_session(&mut link, config.session_id) {
            error!("Could not open session! ({e})");
            link.shutdown();
            return Err(CamError::SessionOpen(e));
        }

        Ok(Self {
            link,
            protocol,
            config,
            open: true,
        })
    }

    /// Closes the session. Equivalent to dropping it.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        if let Err(e) = self.protocol.close_session(&mut self.link) {
            error!("Could not close session! ({e})");
        }

        self.link.shutdown();
        debug!("Session closed");
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoints(&self) -> EndpointSet {
        self.link.endpoints
    }

    /// Current transfer timeout.
    pub fn timeout(&self) -> Duration {
        self.link.timeout
    }

    /// Uses `timeout` for all transfers until the returned guard is dropped.
    pub fn override_timeout(&mut self, timeout: Duration) -> TimeoutOverride<'_, T, P> {
        let previous = std::mem::replace(&mut self.link.timeout, timeout);
        debug!("Transfer timeout set to {timeout:?} (was {previous:?})");

        TimeoutOverride {
            session: self,
            previous,
        }
    }

    /// Runs stall recovery on the bulk endpoints.
    pub fn clear_stall(&mut self) -> StallReport {
        stall::clear_stall(&mut self.link.transport)
    }

    /// Runs stall recovery if `error` happened on the transport.
    pub fn recover(&mut self, error: &PtpError) {
        if error.is_io() {
            self.clear_stall();
        }
    }

    pub fn device_info(&mut self) -> PtpResult<DeviceInfo> {
        self.protocol.get_device_info(&mut self.link)
    }

    /// Lists the handles of all objects on all storages.
    pub fn object_handles(&mut self) -> PtpResult<Vec<u32>> {
        self.protocol.get_object_handles(
            &mut self.link,
            consts::ptp::ALL_STORAGES,
            consts::ptp::ANY_FORMAT,
            consts::ptp::ANY_PARENT,
        )
    }

    pub fn object_info(&mut self, handle: u32) -> PtpResult<ObjectInfo> {
        self.protocol.get_object_info(&mut self.link, handle)
    }

    /// Downloads the object's bytes into `dest`.
    pub fn get_object(&mut self, handle: u32, dest: &mut [u8]) -> PtpResult<()> {
        self.protocol.get_object(&mut self.link, handle, dest)
    }

    pub fn delete_object(&mut self, handle: u32) -> PtpResult<()> {
        self.protocol.delete_object(&mut self.link, handle, consts::ptp::ANY_FORMAT)
    }

    pub fn initiate_capture(&mut self) -> PtpResult<()> {
        self.protocol.initiate_capture(
            &mut self.link,
            consts::ptp::DEFAULT_STORAGE,
            consts::ptp::DEFAULT_FORMAT,
        )
    }

    /// Blocks until the camera reports the next event.
    pub fn wait_event(&mut self) -> PtpResult<CaptureEvent> {
        self.protocol.wait_event(&mut self.link)
    }

    pub fn prop_desc(&mut self, code: u16) -> PtpResult<DevicePropDesc> {
        self.protocol.get_device_prop_desc(&mut self.link, code)
    }

    pub fn set_prop_value(&mut self, code: u16, value: &PropValue) -> PtpResult<()> {
        self.protocol.set_device_prop_value(&mut self.link, code, value)
    }
}

impl<T: Transport, P: PtpProtocol> Drop for Session<T, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Restores the session's previous timeout when dropped.
pub struct TimeoutOverride<'a, T: Transport, P: PtpProtocol> {
    session: &'a mut Session<T, P>,
    previous: Duration,
}

impl<T: Transport, P: PtpProtocol> Deref for TimeoutOverride<'_, T, P> {
    type Target = Session<T, P>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport, P: PtpProtocol> DerefMut for TimeoutOverride<'_, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport, P: PtpProtocol> Drop for TimeoutOverride<'_, T, P> {
    fn drop(&mut self) {
        self.session.link.timeout = self.previous;
        debug!("Transfer timeout restored to {:?}", self.previous);
    }
}
