//! USB device types shared between the USB worker and the request surface
//!
//! These are plain descriptor snapshots. They carry no handles, so they can be
//! cloned freely across the channel bridge and built by hand in tests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// USB endpoint transfer type (bmAttributes bits 0..1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Endpoint descriptor snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Endpoint address including the direction bit
    pub address: u8,
    pub kind: TransferKind,
    pub direction: EndpointDirection,
}

impl EndpointInfo {
    /// Build from a raw endpoint address; the direction comes from bit 7
    pub fn new(address: u8, kind: TransferKind) -> Self {
        let direction = if address & 0x80 != 0 {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        };
        Self {
            address,
            kind,
            direction,
        }
    }

    pub fn is_bulk(&self) -> bool {
        self.kind == TransferKind::Bulk
    }
}

/// Interface descriptor snapshot (first alternate setting)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub number: u8,
    pub class_code: u8,
    pub endpoints: Vec<EndpointInfo>,
}

/// Interface and endpoint a printer payload is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulkOutTarget {
    pub interface_number: u8,
    pub endpoint_address: u8,
}

/// Who a device is
///
/// `name` follows the Android convention `/dev/bus/usb/BBB/AAA` so a name
/// obtained from [`DeviceIdentity::identity_string`] on one side can be handed
/// back on the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
}

impl DeviceIdentity {
    pub fn new(bus_number: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: device_node_name(bus_number, address),
            vendor_id,
            product_id,
            bus_number,
            address,
        }
    }

    /// `name|VID:v|PID:p`, IDs in decimal
    pub fn identity_string(&self) -> String {
        format!(
            "{}|VID:{}|PID:{}",
            self.name, self.vendor_id, self.product_id
        )
    }

    /// Whether a caller-supplied device name refers to this device
    ///
    /// The requested string only has to start with our name, so both the bare
    /// name and a full identity string select the device.
    pub fn matches(&self, requested: &str) -> bool {
        requested.starts_with(&self.name)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

/// Device node path for a bus/address pair
pub fn device_node_name(bus_number: u8, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus_number, address)
}

/// An attached USB device as seen by the enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterDevice {
    pub identity: DeviceIdentity,
    /// USB device class from the device descriptor
    pub class_code: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Interfaces of the active configuration, in descriptor order
    pub interfaces: Vec<InterfaceInfo>,
    /// Whether the device could be opened when it was enumerated
    pub permission_granted: bool,
}

/// Result of asking for device access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    /// Access is already available
    Granted,
    /// A request was issued; the answer arrives later as an event
    Pending,
}
