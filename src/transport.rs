use std::time::Duration;

use log::*;
use nusb::transfer::Control;

use crate::endpoints::{Endpoint, EndpointSet};

/// Error of a single USB transfer.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Error while transfering USB data: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("USB I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout occured during USB transfer")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("The USB interface has already been released")]
    Released,
}

impl TransportError {
    /// Returns `true` if the device answered with a STALL handshake.
    pub fn is_stall(&self) -> bool {
        matches!(self, Self::Transfer(nusb::transfer::TransferError::Stall))
    }
}

/// Raw, one-shot USB primitives of an opened PTP interface.
///
/// Each call blocks for at most the given timeout (control requests use
/// [`crate::consts::CONTROL_TIMEOUT`]) and performs exactly one transfer.
/// Chunking and retries live in [`bulk_read`] and [`interrupt_poll`].
pub trait Transport {
    /// Endpoints resolved when the interface was opened.
    fn endpoints(&self) -> EndpointSet;

    /// Reads at most `buf.len()` bytes. Returns the number of bytes received.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Writes `data` in one transfer. Returns the number of bytes sent.
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Reads at most `buf.len()` bytes from an interrupt endpoint.
    fn read_interrupt(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    fn control_in(&mut self, control: Control, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn control_out(&mut self, control: Control, data: &[u8]) -> Result<usize, TransportError>;

    /// Releases the interface and closes the device. Later calls fail with
    /// [`TransportError::Released`]. Calling it again has no effect.
    fn release(&mut self);
}

/// Fills `dest` from a bulk-in endpoint.
///
/// The read is split into chunks of at most `budget` bytes, the last one sized to the
/// remainder. A chunk that returns zero bytes is retried once; a second zero-length
/// result is accepted. Any error aborts the whole read. Bytes already placed in `dest`
/// are left to the caller.
pub fn bulk_read<T: Transport + ?Sized>(
    transport: &mut T,
    endpoint: Endpoint,
    dest: &mut [u8],
    budget: usize,
    timeout: Duration,
) -> Result<(), TransportError> {
    let total = dest.len();

    for (index, chunk) in dest.chunks_mut(budget.max(1)).enumerate() {
        let mut received = transport
            .read_bulk(endpoint.address(), chunk, timeout)
            .inspect_err(|e| warn!("Bulk read on {endpoint} failed: {e}"))?;

        if received == 0 {
            // Some cameras answer the first request of a chunk with a zero-length packet.
            debug!("Zero-length read on {endpoint}, retrying chunk {index}");
            received = transport
                .read_bulk(endpoint.address(), chunk, timeout)
                .inspect_err(|e| warn!("Bulk read retry on {endpoint} failed: {e}"))?;
        }

        trace!("Chunk {index}: {received}/{} bytes (total {total})", chunk.len());
    }

    Ok(())
}

/// Writes `data` to a bulk-out endpoint in a single transfer.
pub fn bulk_write<T: Transport + ?Sized>(
    transport: &mut T,
    endpoint: Endpoint,
    data: &[u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let sent = transport
        .write_bulk(endpoint.address(), data, timeout)
        .inspect_err(|e| warn!("Bulk write on {endpoint} failed: {e}"))?;

    trace!("Wrote {sent}/{} bytes to {endpoint}", data.len());

    Ok(())
}

/// Polls an interrupt endpoint once, retrying a zero-length result once.
///
/// Returns the number of bytes received, which may be zero.
pub fn interrupt_poll<T: Transport + ?Sized>(
    transport: &mut T,
    endpoint: Endpoint,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, TransportError> {
    debug!("Awaiting event...");

    let received = transport
        .read_interrupt(endpoint.address(), buf, timeout)
        .inspect_err(|e| warn!("Interrupt read on {endpoint} failed: {e}"))?;

    if received != 0 {
        return Ok(received);
    }

    transport
        .read_interrupt(endpoint.address(), buf, timeout)
        .inspect_err(|e| warn!("Interrupt read retry on {endpoint} failed: {e}"))
}
