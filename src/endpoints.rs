use log::*;
use nusb::transfer::EndpointType;

use crate::consts;

/// A resolved endpoint of the PTP interface.
///
/// Address `0` means the descriptor scan did not find the endpoint. Transfers on such
/// an endpoint fail at the USB layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    BulkIn(u8),
    BulkOut(u8),
    InterruptIn(u8),
}

impl Endpoint {
    /// The endpoint address, including the direction bit.
    pub fn address(self) -> u8 {
        match self {
            Self::BulkIn(addr) | Self::BulkOut(addr) | Self::InterruptIn(addr) => addr,
        }
    }

    pub fn is_resolved(self) -> bool {
        self.address() != 0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BulkIn(addr) => write!(f, "inep 0x{addr:02x}"),
            Self::BulkOut(addr) => write!(f, "outep 0x{addr:02x}"),
            Self::InterruptIn(addr) => write!(f, "intep 0x{addr:02x}"),
        }
    }
}

/// The three endpoints a PTP camera exposes on its still image interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSet {
    pub bulk_in: Endpoint,
    pub bulk_out: Endpoint,
    pub interrupt_in: Endpoint,
}

impl Default for EndpointSet {
    fn default() -> Self {
        Self {
            bulk_in: Endpoint::BulkIn(0),
            bulk_out: Endpoint::BulkOut(0),
            interrupt_in: Endpoint::InterruptIn(0),
        }
    }
}

impl EndpointSet {
    /// Sorts endpoint descriptors (transfer type, address) into bulk-in, bulk-out and interrupt-in.
    ///
    /// When several descriptors match the same role, the last one wins.
    /// Missing endpoints stay unresolved.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = (EndpointType, u8)>) -> Self {
        let mut set = Self::default();

        for (transfer_type, address) in descriptors {
            let is_in = address & consts::usb::ENDPOINT_DIR_IN != 0;

            match (transfer_type, is_in) {
                (EndpointType::Bulk, true) => {
                    set.bulk_in = Endpoint::BulkIn(address);
                    debug!("Found {}", set.bulk_in);
                }
                (EndpointType::Bulk, false) => {
                    set.bulk_out = Endpoint::BulkOut(address);
                    debug!("Found {}", set.bulk_out);
                }
                (EndpointType::Interrupt, true) => {
                    set.interrupt_in = Endpoint::InterruptIn(address);
                    debug!("Found {}", set.interrupt_in);
                }
                _ => trace!("Ignoring endpoint 0x{address:02x} ({transfer_type:?})"),
            }
        }

        set
    }

    /// Resolves the endpoints of an interface alternate setting.
    pub fn from_alt_setting(alt: &nusb::descriptors::InterfaceAltSetting<'_>) -> Self {
        Self::from_descriptors(alt.endpoints().map(|ep| (ep.transfer_type(), ep.address())))
    }

    /// Returns `true` if all three endpoints were found.
    pub fn is_complete(&self) -> bool {
        self.bulk_in.is_resolved() && self.bulk_out.is_resolved() && self.interrupt_in.is_resolved()
    }
}
