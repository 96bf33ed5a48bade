use chrono::{DateTime, Utc};

use crate::{consts, transport::TransportError, CamError};

/// A PTP response code. `ResponseCode::OK` is the only success value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    pub const UNDEFINED: Self = Self(0x2000);
    pub const OK: Self = Self(0x2001);
    pub const GENERAL_ERROR: Self = Self(0x2002);
    pub const SESSION_NOT_OPEN: Self = Self(0x2003);
    pub const INVALID_TRANSACTION_ID: Self = Self(0x2004);
    pub const OPERATION_NOT_SUPPORTED: Self = Self(0x2005);
    pub const PARAMETER_NOT_SUPPORTED: Self = Self(0x2006);
    pub const INCOMPLETE_TRANSFER: Self = Self(0x2007);
    pub const INVALID_STORAGE_ID: Self = Self(0x2008);
    pub const INVALID_OBJECT_HANDLE: Self = Self(0x2009);
    pub const DEVICE_PROP_NOT_SUPPORTED: Self = Self(0x200A);
    pub const INVALID_OBJECT_FORMAT_CODE: Self = Self(0x200B);
    pub const STORE_FULL: Self = Self(0x200C);
    pub const OBJECT_WRITE_PROTECTED: Self = Self(0x200D);
    pub const STORE_READ_ONLY: Self = Self(0x200E);
    pub const ACCESS_DENIED: Self = Self(0x200F);
    pub const NO_THUMBNAIL_PRESENT: Self = Self(0x2010);
    pub const SELF_TEST_FAILED: Self = Self(0x2011);
    pub const PARTIAL_DELETION: Self = Self(0x2012);
    pub const STORE_NOT_AVAILABLE: Self = Self(0x2013);
    pub const SPECIFICATION_BY_FORMAT_UNSUPPORTED: Self = Self(0x2014);
    pub const NO_VALID_OBJECT_INFO: Self = Self(0x2015);
    pub const INVALID_CODE_FORMAT: Self = Self(0x2016);
    pub const UNKNOWN_VENDOR_CODE: Self = Self(0x2017);
    pub const CAPTURE_ALREADY_TERMINATED: Self = Self(0x2018);
    pub const DEVICE_BUSY: Self = Self(0x2019);
    pub const INVALID_PARENT_OBJECT: Self = Self(0x201A);
    pub const INVALID_DEVICE_PROP_FORMAT: Self = Self(0x201B);
    pub const INVALID_DEVICE_PROP_VALUE: Self = Self(0x201C);
    pub const INVALID_PARAMETER: Self = Self(0x201D);
    pub const SESSION_ALREADY_OPENED: Self = Self(0x201E);
    pub const TRANSACTION_CANCELED: Self = Self(0x201F);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Human-readable description of the standard response codes.
    pub fn message(self) -> &'static str {
        match self.0 {
            0x2000 => "Undefined",
            0x2001 => "OK",
            0x2002 => "General Error",
            0x2003 => "Session Not Open",
            0x2004 => "Invalid TransactionID",
            0x2005 => "Operation Not Supported",
            0x2006 => "Parameter Not Supported",
            0x2007 => "Incomplete Transfer",
            0x2008 => "Invalid StorageID",
            0x2009 => "Invalid ObjectHandle",
            0x200A => "DeviceProp Not Supported",
            0x200B => "Invalid ObjectFormatCode",
            0x200C => "Store Full",
            0x200D => "Object WriteProtected",
            0x200E => "Store Read-Only",
            0x200F => "Access Denied",
            0x2010 => "No Thumbnail Present",
            0x2011 => "SelfTest Failed",
            0x2012 => "Partial Deletion",
            0x2013 => "Store Not Available",
            0x2014 => "Specification By Format Unsupported",
            0x2015 => "No Valid ObjectInfo",
            0x2016 => "Invalid Code Format",
            0x2017 => "Unknown Vendor Code",
            0x2018 => "Capture Already Terminated",
            0x2019 => "Device Busy",
            0x201A => "Invalid ParentObject",
            0x201B => "Invalid DeviceProp Format",
            0x201C => "Invalid DeviceProp Value",
            0x201D => "Invalid Parameter",
            0x201E => "Session Already Opened",
            0x201F => "Transaction Canceled",
            _ => "Unknown Error",
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:04X})", self.message(), self.0)
    }
}

/// Error returned by the PTP command layer.
#[derive(thiserror::Error, Debug)]
pub enum PtpError {
    #[error("PTP error: {0}")]
    Response(ResponseCode),

    #[error("PTP I/O error")]
    Io(#[from] TransportError),

    #[error("Malformed PTP data: {0}")]
    Data(String),
}

impl PtpError {
    /// Returns `true` if the failure happened on the USB transport.
    /// Those are the failures after which the bulk endpoints may be halted.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

pub type PtpResult<T> = Result<T, PtpError>;

/// Byte order of the PTP data phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    /// Always used over USB.
    #[default]
    LittleEndian,
    BigEndian,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, int_enum::IntEnum)]
/// Standard PTP event codes.
pub enum EventCode {
    Undefined = 0x4000,
    CancelTransaction = 0x4001,
    ObjectAdded = 0x4002,
    ObjectRemoved = 0x4003,
    StoreAdded = 0x4004,
    StoreRemoved = 0x4005,
    DevicePropChanged = 0x4006,
    ObjectInfoChanged = 0x4007,
    DeviceInfoChanged = 0x4008,
    RequestObjectTransfer = 0x4009,
    StoreFull = 0x400A,
    DeviceReset = 0x400B,
    StorageInfoChanged = 0x400C,
    CaptureComplete = 0x400D,
    UnreportedStatus = 0x400E,
}

/// An event received on the interrupt endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureEvent {
    pub code: u16,
    pub transaction_id: u32,
    pub params: Vec<u32>,
}

impl CaptureEvent {
    pub fn new(code: EventCode, params: &[u32]) -> Self {
        Self {
            code: code.into(),
            transaction_id: 0,
            params: params.to_vec(),
        }
    }

    /// Returns the standard event code, if the camera sent one.
    pub fn kind(&self) -> Option<EventCode> {
        EventCode::try_from(self.code).ok()
    }

    /// First event parameter. For `ObjectAdded` this is the new object handle.
    pub fn param1(&self) -> Option<u32> {
        self.params.first().copied()
    }
}

/// Camera-reported metadata of one stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub handle: u32,
    pub storage_id: u32,
    pub format: u16,
    pub compressed_size: u32,
    pub parent: u32,
    pub filename: String,
    pub capture_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    /// Folders and other containers. They are never downloaded or deleted.
    pub fn is_association(&self) -> bool {
        self.format == consts::ptp::OFC_ASSOCIATION
    }
}

/// The camera's device info dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    pub vendor_extension_version: u16,
    pub vendor_extension_desc: String,
    pub functional_mode: u16,
    pub operations_supported: Vec<u16>,
    pub events_supported: Vec<u16>,
    pub device_properties_supported: Vec<u16>,
    pub capture_formats: Vec<u16>,
    pub image_formats: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn supports_property(&self, code: u16) -> bool {
        self.device_properties_supported.contains(&code)
    }

    pub fn supports_operation(&self, code: u16) -> bool {
        self.operations_supported.contains(&code)
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, int_enum::IntEnum)]
/// Data types of device property values handled by this crate.
pub enum DataType {
    Int8 = 0x0001,
    Uint8 = 0x0002,
    Int16 = 0x0003,
    Uint16 = 0x0004,
    Int32 = 0x0005,
    Uint32 = 0x0006,
    Str = 0xFFFF,
}

/// A device property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Str(String),
}

impl Default for PropValue {
    fn default() -> Self {
        Self::Uint32(0)
    }
}

impl PropValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::Uint8(_) => DataType::Uint8,
            Self::Int16(_) => DataType::Int16,
            Self::Uint16(_) => DataType::Uint16,
            Self::Int32(_) => DataType::Int32,
            Self::Uint32(_) => DataType::Uint32,
            Self::Str(_) => DataType::Str,
        }
    }

    /// Parses a user-supplied value into the given data type.
    ///
    /// Integers accept a `0x` prefix for hexadecimal, a leading `0` for octal
    /// and plain decimal otherwise, with an optional sign. Values wider than the
    /// target type are truncated to it. Strings are taken verbatim.
    pub fn parse(data_type: u16, text: &str) -> Result<Self, CamError> {
        let invalid = || CamError::InvalidValue {
            value: text.to_string(),
            data_type,
        };

        let int = || parse_int(text).ok_or_else(invalid);

        Ok(match DataType::try_from(data_type).map_err(|_| invalid())? {
            DataType::Int8 => Self::Int8(int()? as i8),
            DataType::Uint8 => Self::Uint8(int()? as u8),
            DataType::Int16 => Self::Int16(int()? as i16),
            DataType::Uint16 => Self::Uint16(int()? as u16),
            DataType::Int32 => Self::Int32(int()? as i32),
            DataType::Uint32 => Self::Uint32(int()? as u32),
            DataType::Str => Self::Str(text.to_string()),
        })
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Allowed values of a device property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropForm {
    #[default]
    None,
    Range {
        min: PropValue,
        max: PropValue,
        step: PropValue,
    },
    Enumeration(Vec<PropValue>),
}

/// A device property description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePropDesc {
    pub code: u16,
    pub data_type: u16,
    /// `false` for read-only properties.
    pub settable: bool,
    pub factory_default: PropValue,
    pub current: PropValue,
    pub form: PropForm,
}

/// The transport entry points offered to the PTP command layer.
///
/// A session implements this trait over its USB transport. Every call blocks
/// for at most the session's current timeout.
pub trait PtpIo {
    /// Sends a command or data container on the bulk-out endpoint.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Fills `dest` from the bulk-in endpoint, splitting the read into chunks
    /// of at most the transfer budget.
    fn read(&mut self, dest: &mut [u8]) -> Result<(), TransportError>;

    /// Polls the interrupt endpoint once for an event container.
    /// Returns the number of bytes received.
    fn check_int(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Returns the next transaction id and advances the counter.
    fn next_transaction_id(&mut self) -> u32;

    fn byte_order(&self) -> ByteOrder;
}

/// The PTP command layer: builds and parses containers and runs one
/// transaction per call over the given [`PtpIo`].
///
/// Every method returns `Ok` only if the camera answered with `ResponseCode::OK`.
pub trait PtpProtocol {
    fn open_session(&mut self, io: &mut dyn PtpIo, session_id: u32) -> PtpResult<()>;

    fn close_session(&mut self, io: &mut dyn PtpIo) -> PtpResult<()>;

    fn get_device_info(&mut self, io: &mut dyn PtpIo) -> PtpResult<DeviceInfo>;

    fn get_object_handles(
        &mut self,
        io: &mut dyn PtpIo,
        storage: u32,
        format: u16,
        parent: u32,
    ) -> PtpResult<Vec<u32>>;

    fn get_object_info(&mut self, io: &mut dyn PtpIo, handle: u32) -> PtpResult<ObjectInfo>;

    /// Reads the object's bytes into `dest`, which is sized to the object's compressed size.
    fn get_object(&mut self, io: &mut dyn PtpIo, handle: u32, dest: &mut [u8]) -> PtpResult<()>;

    fn delete_object(&mut self, io: &mut dyn PtpIo, handle: u32, format: u16) -> PtpResult<()>;

    fn initiate_capture(&mut self, io: &mut dyn PtpIo, storage: u32, format: u16) -> PtpResult<()>;

    /// Waits for the next event on the interrupt endpoint.
    fn wait_event(&mut self, io: &mut dyn PtpIo) -> PtpResult<CaptureEvent>;

    fn get_device_prop_desc(&mut self, io: &mut dyn PtpIo, code: u16) -> PtpResult<DevicePropDesc>;

    fn get_device_prop_value(
        &mut self,
        io: &mut dyn PtpIo,
        code: u16,
        data_type: u16,
    ) -> PtpResult<PropValue>;

    fn set_device_prop_value(
        &mut self,
        io: &mut dyn PtpIo,
        code: u16,
        value: &PropValue,
    ) -> PtpResult<()>;
}
