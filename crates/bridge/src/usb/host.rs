//! Platform USB seam
//!
//! Everything above this module talks to USB through [`UsbHost`] and
//! [`UsbConnection`]. The libusb implementation lives in
//! [`crate::usb::device`]; tests drive the same code with an in-memory
//! host. The host is shared between the command and transfer threads.

use crate::usb::permission::PermissionListener;
use common::{DeviceIdentity, PrinterDevice};
use std::time::Duration;

/// Access to the platform's USB stack
pub trait UsbHost: Send + Sync + 'static {
    type Connection: UsbConnection;

    /// Snapshot of the attached devices, in platform order
    fn devices(&self) -> Result<Vec<PrinterDevice>, rusb::Error>;

    /// Whether the device can be opened right now
    fn has_permission(&self, device: &DeviceIdentity) -> bool;

    /// Ask the platform for access to a device
    ///
    /// Returns once the request is issued. The implementation must deliver
    /// `listener` exactly once, from any thread, when the answer is known.
    fn request_permission(
        &self,
        device: &DeviceIdentity,
        listener: PermissionListener,
    ) -> Result<(), rusb::Error>;

    /// Open a connection to a device
    fn open(&self, device: &DeviceIdentity) -> Result<Self::Connection, rusb::Error>;
}

/// An open device connection
pub trait UsbConnection {
    /// Claim an interface; with `force` any bound kernel driver is detached first
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<(), rusb::Error>;

    /// Bulk write to an OUT endpoint, returning the number of bytes accepted
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Release a claimed interface, restoring a detached kernel driver
    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    /// Close the connection
    fn close(self);
}
