use std::time::Duration;

/// Default timeout for all bulk and interrupt transfers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

/// Timeout used for the whole duration of a capture operation.
/// Cameras can take a long time between the capture command and the first event.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_millis(20000);

/// Timeout for the standard and class-specific control requests.
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(3000);

/// Maximum size of a single bulk transfer request (2 MiB).
/// Larger reads are split into chunks of this size.
pub const TRANSFER_BUDGET: usize = 2 * 1024 * 1024;

/// Session id used when opening a PTP session.
pub const DEFAULT_SESSION_ID: u32 = 1;

/// Size of the buffer handed to the interrupt endpoint when waiting for an event.
pub const EVENT_BUFFER_SIZE: usize = 512;

/// Contains USB descriptor constants.
pub mod usb {
    /// Still image (PTP) interface class.
    pub const CLASS_PTP: u8 = 6;
    /// Hub device class, never a camera.
    pub const CLASS_HUB: u8 = 9;

    /// Direction bit of an endpoint address.
    pub const ENDPOINT_DIR_IN: u8 = 0x80;

    /// Standard GET_STATUS request.
    pub const REQ_GET_STATUS: u8 = 0x00;
    /// Standard CLEAR_FEATURE request.
    pub const REQ_CLEAR_FEATURE: u8 = 0x01;
    /// ENDPOINT_HALT feature selector.
    pub const FEATURE_HALT: u16 = 0x00;

    /// Still image class request: Device Reset.
    pub const REQ_DEVICE_RESET: u8 = 0x66;
    /// Still image class request: Get Device Status.
    pub const REQ_GET_DEVICE_STATUS: u8 = 0x67;
}

/// Contains the PTP codes this crate acts upon.
pub mod ptp {
    /// Object format of folders and other containers.
    pub const OFC_ASSOCIATION: u16 = 0x3001;

    /// Handle listing filter: all storages.
    pub const ALL_STORAGES: u32 = 0xFFFF_FFFF;
    /// Handle listing filter: any format.
    pub const ANY_FORMAT: u16 = 0x0000;
    /// Handle listing filter: any parent.
    pub const ANY_PARENT: u32 = 0x0000_0000;

    /// Capture into the default storage.
    pub const DEFAULT_STORAGE: u32 = 0x0000_0000;
    /// Capture using the camera's default format.
    pub const DEFAULT_FORMAT: u16 = 0x0000;
}
