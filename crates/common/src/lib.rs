//! Common utilities for usb-printer-bridge
//!
//! This crate provides shared functionality between the USB worker and the
//! request surface: USB device snapshots, error types, logging setup, and the
//! async channel bridge for USB thread communication.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb_types;


pub use channel::{
    EventSender, JobOutcome, UsbBridge, UsbCommand, UsbEvent, UsbWorker, create_usb_bridge,
};
pub use error::{Error, PrintError, Result, TransferStage};
pub use logging::setup_logging;
pub use usb_types::{
    BulkOutTarget, DeviceIdentity, EndpointDirection, EndpointInfo, InterfaceInfo,
    PermissionStatus, PrinterDevice, TransferKind,
};
