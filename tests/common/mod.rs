#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
    time::Duration,
};

use nusb::transfer::{Control, ControlType, TransferError};
use ptpcam_rs::{
    consts::{self, usb::REQ_GET_STATUS},
    endpoints::{Endpoint, EndpointSet},
    ptp::{
        CaptureEvent, DeviceInfo, DevicePropDesc, EventCode, ObjectInfo, PropValue, PtpError, PtpIo,
        PtpProtocol, PtpResult, ResponseCode,
    },
    session::{Session, SessionConfig},
    transport::{Transport, TransportError},
};

pub const BULK_IN: u8 = 0x81;
pub const BULK_OUT: u8 = 0x02;
pub const INTERRUPT_IN: u8 = 0x83;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn camera_endpoints() -> EndpointSet {
    EndpointSet {
        bulk_in: Endpoint::BulkIn(BULK_IN),
        bulk_out: Endpoint::BulkOut(BULK_OUT),
        interrupt_in: Endpoint::InterruptIn(INTERRUPT_IN),
    }
}

/// A USB request seen by the mock transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub class: bool,
    pub request: u8,
    pub index: u16,
}

/// Everything the mock transport observed, shared with the test.
#[derive(Debug, Default)]
pub struct UsbState {
    /// Requested length of every bulk read.
    pub bulk_reads: Vec<usize>,
    pub bulk_writes: Vec<usize>,
    /// Timeout of every bulk and interrupt transfer, in order.
    pub timeouts: Vec<Duration>,
    pub control_in: Vec<Request>,
    pub control_out: Vec<Request>,
    pub releases: usize,
    /// Endpoint addresses reporting a halt.
    pub halted: HashSet<u8>,
    /// Every control request fails when set.
    pub controls_fail: bool,
    /// Device status code returned by GET_DEVICE_STATUS.
    pub device_status: u16,
}

impl UsbState {
    pub fn cleared_halts(&self) -> Vec<u16> {
        self.control_out
            .iter()
            .filter(|r| !r.class && r.request == consts::usb::REQ_CLEAR_FEATURE)
            .map(|r| r.index)
            .collect()
    }
}

pub struct MockTransport {
    endpoints: EndpointSet,
    state: Rc<RefCell<UsbState>>,
}

impl MockTransport {
    pub fn new() -> (Self, Rc<RefCell<UsbState>>) {
        Self::with_endpoints(camera_endpoints())
    }

    pub fn with_endpoints(endpoints: EndpointSet) -> (Self, Rc<RefCell<UsbState>>) {
        let state = Rc::new(RefCell::new(UsbState {
            device_status: ResponseCode::OK.0,
            ..Default::default()
        }));

        (
            Self {
                endpoints,
                state: state.clone(),
            },
            state,
        )
    }

    fn request(control: &Control) -> Request {
        Request {
            class: control.control_type == ControlType::Class,
            request: control.request,
            index: control.index,
        }
    }
}

impl Transport for MockTransport {
    fn endpoints(&self) -> EndpointSet {
        self.endpoints
    }

    fn read_bulk(&mut self, _endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        state.bulk_reads.push(buf.len());
        state.timeouts.push(timeout);
        buf.fill(0xA5);
        Ok(buf.len())
    }

    fn write_bulk(&mut self, _endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        state.bulk_writes.push(data.len());
        state.timeouts.push(timeout);
        Ok(data.len())
    }

    fn read_interrupt(&mut self, _endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.state.borrow_mut().timeouts.push(timeout);
        let n = buf.len().min(12);
        Ok(n)
    }

    fn control_in(&mut self, control: Control, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        state.control_in.push(Self::request(&control));

        if state.controls_fail {
            return Err(TransferError::Stall.into());
        }

        let reply = if control.control_type == ControlType::Class {
            let code = state.device_status.to_le_bytes();
            vec![4, 0, code[0], code[1]]
        } else if control.request == REQ_GET_STATUS {
            let halted = state.halted.contains(&(control.index as u8));
            vec![u8::from(halted), 0]
        } else {
            Vec::new()
        };

        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }

    fn control_out(&mut self, control: Control, _data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        state.control_out.push(Self::request(&control));

        if state.controls_fail {
            return Err(TransferError::Stall.into());
        }

        if control.request == consts::usb::REQ_CLEAR_FEATURE {
            state.halted.remove(&(control.index as u8));
        }

        Ok(0)
    }

    fn release(&mut self) {
        self.state.borrow_mut().releases += 1;
    }
}

/// A scripted failure of the mock camera. Errors are not `Clone`, so they are built on use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    /// Transport failure, triggers stall recovery.
    Io,
    /// Camera answered with this response code.
    Response(u16),
}

impl Fail {
    pub fn error(self) -> PtpError {
        match self {
            Fail::Io => PtpError::Io(TransportError::Transfer(TransferError::Stall)),
            Fail::Response(code) => PtpError::Response(ResponseCode(code)),
        }
    }
}

/// State of the scripted camera, shared with the test.
#[derive(Debug, Default)]
pub struct CameraState {
    pub device_info: DeviceInfo,
    pub objects: Vec<ObjectInfo>,
    pub props: HashMap<u16, DevicePropDesc>,
    pub events: VecDeque<Result<CaptureEvent, Fail>>,

    pub open_fails: Option<Fail>,
    pub close_fails: Option<Fail>,
    pub device_info_fails: Option<Fail>,
    pub handles_fail: Option<Fail>,
    pub info_fails: HashMap<u32, Fail>,
    pub data_fails: HashMap<u32, Fail>,
    pub delete_fails: HashMap<u32, Fail>,
    pub capture_fails: Option<Fail>,

    pub transaction_ids: Vec<u32>,
    pub sessions_opened: Vec<u32>,
    pub sessions_closed: usize,
    pub captures: usize,
    pub downloaded: Vec<u32>,
    pub deleted: Vec<u32>,
    pub set_values: Vec<(u16, PropValue)>,
}

impl CameraState {
    pub fn add_object(&mut self, handle: u32, filename: &str, size: u32) {
        self.objects.push(ObjectInfo {
            handle,
            storage_id: 0x0001_0001,
            format: 0x3801,
            compressed_size: size,
            filename: filename.to_string(),
            ..Default::default()
        });
    }

    pub fn add_folder(&mut self, handle: u32, filename: &str) {
        self.objects.push(ObjectInfo {
            handle,
            storage_id: 0x0001_0001,
            format: consts::ptp::OFC_ASSOCIATION,
            filename: filename.to_string(),
            ..Default::default()
        });
    }

    pub fn push_event(&mut self, code: EventCode, params: &[u32]) {
        self.events.push_back(Ok(CaptureEvent::new(code, params)));
    }

    fn find(&self, handle: u32) -> PtpResult<ObjectInfo> {
        self.objects
            .iter()
            .find(|o| o.handle == handle)
            .cloned()
            .ok_or(PtpError::Response(ResponseCode::INVALID_OBJECT_HANDLE))
    }
}

pub struct MockCamera {
    state: Rc<RefCell<CameraState>>,
}

impl MockCamera {
    pub fn new() -> (Self, Rc<RefCell<CameraState>>) {
        let state = Rc::new(RefCell::new(CameraState {
            device_info: DeviceInfo {
                manufacturer: "Mock".to_string(),
                model: "Mock Camera 1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }));

        (Self { state: state.clone() }, state)
    }
}

fn check(fail: Option<Fail>) -> PtpResult<()> {
    fail.map_or(Ok(()), |f| Err(f.error()))
}

impl MockCamera {
    /// Sends a dummy command container so the session's link sees traffic.
    fn command(&self, io: &mut dyn PtpIo) -> PtpResult<()> {
        let id = io.next_transaction_id();
        self.state.borrow_mut().transaction_ids.push(id);
        io.write(&[0u8; 12])?;
        Ok(())
    }
}

impl PtpProtocol for MockCamera {
    fn open_session(&mut self, io: &mut dyn PtpIo, session_id: u32) -> PtpResult<()> {
        self.command(io)?;
        let mut state = self.state.borrow_mut();
        check(state.open_fails)?;
        state.sessions_opened.push(session_id);
        Ok(())
    }

    fn close_session(&mut self, io: &mut dyn PtpIo) -> PtpResult<()> {
        self.command(io)?;
        let mut state = self.state.borrow_mut();
        state.sessions_closed += 1;
        check(state.close_fails)
    }

    fn get_device_info(&mut self, io: &mut dyn PtpIo) -> PtpResult<DeviceInfo> {
        self.command(io)?;
        let state = self.state.borrow();
        check(state.device_info_fails)?;
        Ok(state.device_info.clone())
    }

    fn get_object_handles(
        &mut self,
        io: &mut dyn PtpIo,
        storage: u32,
        _format: u16,
        _parent: u32,
    ) -> PtpResult<Vec<u32>> {
        self.command(io)?;
        assert_eq!(storage, consts::ptp::ALL_STORAGES);
        let state = self.state.borrow();
        check(state.handles_fail)?;
        Ok(state.objects.iter().map(|o| o.handle).collect())
    }

    fn get_object_info(&mut self, io: &mut dyn PtpIo, handle: u32) -> PtpResult<ObjectInfo> {
        self.command(io)?;
        let state = self.state.borrow();
        check(state.info_fails.get(&handle).copied())?;
        state.find(handle)
    }

    fn get_object(&mut self, io: &mut dyn PtpIo, handle: u32, dest: &mut [u8]) -> PtpResult<()> {
        self.command(io)?;
        check(self.state.borrow().data_fails.get(&handle).copied())?;
        io.read(dest)?;
        self.state.borrow_mut().downloaded.push(handle);
        Ok(())
    }

    fn delete_object(&mut self, io: &mut dyn PtpIo, handle: u32, _format: u16) -> PtpResult<()> {
        self.command(io)?;
        let mut state = self.state.borrow_mut();
        check(state.delete_fails.get(&handle).copied())?;
        state.find(handle)?;
        state.objects.retain(|o| o.handle != handle);
        state.deleted.push(handle);
        Ok(())
    }

    fn initiate_capture(&mut self, io: &mut dyn PtpIo, _storage: u32, _format: u16) -> PtpResult<()> {
        self.command(io)?;
        let mut state = self.state.borrow_mut();
        check(state.capture_fails)?;
        state.captures += 1;
        Ok(())
    }

    fn wait_event(&mut self, io: &mut dyn PtpIo) -> PtpResult<CaptureEvent> {
        let mut buf = [0u8; consts::EVENT_BUFFER_SIZE];
        io.check_int(&mut buf)?;

        match self.state.borrow_mut().events.pop_front() {
            Some(Ok(event)) => Ok(event),
            Some(Err(fail)) => Err(fail.error()),
            None => Err(Fail::Io.error()),
        }
    }

    fn get_device_prop_desc(&mut self, io: &mut dyn PtpIo, code: u16) -> PtpResult<DevicePropDesc> {
        self.command(io)?;
        self.state
            .borrow()
            .props
            .get(&code)
            .cloned()
            .ok_or(PtpError::Response(ResponseCode::DEVICE_PROP_NOT_SUPPORTED))
    }

    fn get_device_prop_value(&mut self, io: &mut dyn PtpIo, code: u16, _data_type: u16) -> PtpResult<PropValue> {
        self.get_device_prop_desc(io, code).map(|desc| desc.current)
    }

    fn set_device_prop_value(&mut self, io: &mut dyn PtpIo, code: u16, value: &PropValue) -> PtpResult<()> {
        self.command(io)?;
        let mut state = self.state.borrow_mut();
        state.set_values.push((code, value.clone()));
        if let Some(desc) = state.props.get_mut(&code) {
            desc.current = value.clone();
        }
        Ok(())
    }
}

pub type MockSession = Session<MockTransport, MockCamera>;

/// An open session over the mocks, plus handles to their shared state.
pub fn open_session() -> (MockSession, Rc<RefCell<UsbState>>, Rc<RefCell<CameraState>>) {
    let (transport, usb) = MockTransport::new();
    let (camera, cam) = MockCamera::new();

    let session = match Session::open(transport, camera, SessionConfig::default()) {
        Ok(session) => session,
        Err(e) => panic!("mock session failed to open: {e}"),
    };

    (session, usb, cam)
}
