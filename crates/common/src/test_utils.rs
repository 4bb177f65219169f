//! Test utilities for usb-printer-bridge
//!
//! Provides device descriptor builders and async helpers for tests across
//! crates. Other crates reach it through the `test-utils` feature.

use crate::usb_types::{
    DeviceIdentity, EndpointInfo, InterfaceInfo, PrinterDevice, TransferKind,
};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// USB printer class code
pub const PRINTER_CLASS: u8 = 0x07;

/// Printer-class interface with one bulk OUT and one bulk IN endpoint
pub fn create_printer_interface(number: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        class_code: PRINTER_CLASS,
        endpoints: vec![
            EndpointInfo::new(0x01, TransferKind::Bulk),
            EndpointInfo::new(0x82, TransferKind::Bulk),
        ],
    }
}

/// Build a device with the given interfaces, permission granted
pub fn create_mock_device(
    bus: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
    interfaces: Vec<InterfaceInfo>,
) -> PrinterDevice {
    PrinterDevice {
        identity: DeviceIdentity::new(bus, address, vendor_id, product_id),
        class_code: 0x00,
        manufacturer: Some(format!("Test Manufacturer {}", address)),
        product: Some(format!("Test Printer {}", address)),
        interfaces,
        permission_granted: true,
    }
}

/// Typical ESC/POS receipt printer (0x0416:0x5011)
pub fn create_mock_receipt_printer(bus: u8, address: u8) -> PrinterDevice {
    create_mock_device(bus, address, 0x0416, 0x5011, vec![create_printer_interface(0)])
}

/// Typical TSPL label printer (0x2d37:0x62ba)
pub fn create_mock_label_printer(bus: u8, address: u8) -> PrinterDevice {
    create_mock_device(bus, address, 0x2d37, 0x62ba, vec![create_printer_interface(0)])
}

/// HID keyboard: interrupt endpoints only
pub fn create_mock_keyboard(bus: u8, address: u8) -> PrinterDevice {
    create_mock_device(
        bus,
        address,
        0x046d,
        0xc31c,
        vec![InterfaceInfo {
            number: 0,
            class_code: 0x03,
            endpoints: vec![EndpointInfo::new(0x81, TransferKind::Interrupt)],
        }],
    )
}

/// Create `count` receipt printers on bus 1, addresses 1..=count
pub fn create_mock_device_list(count: u8) -> Vec<PrinterDevice> {
    (1..=count)
        .map(|address| create_mock_receipt_printer(1, address))
        .collect()
}

/// Run a future with a timeout
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
