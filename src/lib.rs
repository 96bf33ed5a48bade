//! A Rust userspace transport and workflow layer for PTP (Picture Transfer Protocol) cameras.
//!
//! This library uses the [nusb] library to find the camera, claim its still image interface
//! and move PTP containers over the bulk endpoints. Encoding and decoding of the PTP
//! operations themselves is left to a [`ptp::PtpProtocol`] implementation, which receives
//! the session's USB link as a [`ptp::PtpIo`].
//!
//! On top of that the crate provides capturing with download, batch download/delete of all
//! objects, stall recovery and device reset.
//!
//! [nusb]: https://github.com/kevinmehall/nusb
//!
//! ## Example
//!
//! More examples are provided in the `demos/` folder.
//!
//! ```no_run
//! use ptpcam_rs::{
//!     capture::{self, CaptureOptions},
//!     download::OverwritePolicy,
//!     ptp::PtpProtocol,
//!     session::{Session, SessionConfig},
//! };
//!
//! fn take_picture<P: PtpProtocol>(protocol: P) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::connect(0, 0, false, protocol, SessionConfig::default())?;
//!
//!     println!("Camera: {}", session.device_info()?.model);
//!
//!     let options = CaptureOptions::new(".", OverwritePolicy::SkipExisting);
//!     let report = capture::capture(&mut session, &options)?;
//!
//!     println!("{:?}", report.outcome);
//!
//!     Ok(())
//! }
//! ```

use ptp::PtpError;
use transport::TransportError;

/// Contains default values, USB request codes and the PTP codes this crate acts upon.
pub mod consts;

/// Contains the PTP data types and the traits connecting the PTP command layer to the transport.
pub mod ptp;

/// Contains endpoint roles and their resolution from interface descriptors.
pub mod endpoints;

/// Contains the transport abstraction and the chunked bulk read.
pub mod transport;

/// Contains stall (endpoint halt) recovery.
pub mod stall;

/// Contains USB device discovery and the nusb transport.
pub mod usb;

/// Contains the PTP session.
pub mod session;

/// Contains single-object download and deletion.
pub mod download;

/// Contains the capture workflow.
pub mod capture;

/// Contains operations on all objects of the camera.
pub mod batch;

/// Contains the device reset sequence.
pub mod reset;

/// Contains various convenience queries on an open session.
pub mod util;

/// Crate-specific error enum.
/// Every function interacting with the camera returns a Result enum with this error type.
#[derive(thiserror::Error, Debug)]
pub enum CamError {
    #[error("USB transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal I/O error occured: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ptp(#[from] PtpError),

    #[error("Could not open session: {0}")]
    SessionOpen(#[source] PtpError),

    #[error("Couldn't find a device matching bus/dev numbers: {bus:03}/{dev:03}")]
    NoDeviceFound { bus: u8, dev: u8 },

    #[error("The device does not support property 0x{code:04x}")]
    PropertyNotSupported { code: u16 },

    #[error("Invalid value '{value}' for data type 0x{data_type:04x}")]
    InvalidValue { value: String, data_type: u16 },

    #[error("Unusable USB configuration: {0}")]
    Configuration(String),
}

pub type CamResult<T> = Result<T, CamError>;
