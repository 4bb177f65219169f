//! USB device manager
//!
//! Enumerates devices through the host, applies the configured VID:PID
//! filters, and resolves caller-supplied device names. Enumeration is done
//! fresh on every call; nothing is cached between requests.

use crate::usb::host::UsbHost;
use common::PrinterDevice;
use std::sync::Arc;
use tracing::{debug, warn};

/// Linux Foundation vendor ID used by root hubs
const ROOT_HUB_VENDOR: u16 = 0x1d6b;

/// USB hub device class
const HUB_CLASS: u8 = 0x09;

/// USB device manager
pub struct DeviceManager<H: UsbHost> {
    host: Arc<H>,
    /// Device filters (VID:PID patterns)
    allowed_filters: Vec<String>,
}

impl<H: UsbHost> DeviceManager<H> {
    /// Create a new device manager
    pub fn new(host: H, allowed_filters: Vec<String>) -> Self {
        Self {
            host: Arc::new(host),
            allowed_filters,
        }
    }

    /// The underlying host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// A handle to the host for another thread
    pub fn shared_host(&self) -> Arc<H> {
        Arc::clone(&self.host)
    }

    /// List all attached devices that pass the filters
    ///
    /// A failing enumeration is logged and reported as an empty list.
    pub fn list_devices(&self) -> Vec<PrinterDevice> {
        let devices = match self.host.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .into_iter()
            .filter(|device| {
                if is_root_hub(device) {
                    debug!("Skipping root hub {}", device.identity);
                    return false;
                }
                let allowed = Self::check_filter(
                    device.identity.vendor_id,
                    device.identity.product_id,
                    &self.allowed_filters,
                );
                if !allowed {
                    debug!("Device ignored by filter: {}", device.identity);
                }
                allowed
            })
            .collect()
    }

    /// `name|VID:v|PID:p` for every listed device
    pub fn identity_strings(&self) -> Vec<String> {
        self.list_devices()
            .iter()
            .map(|device| device.identity.identity_string())
            .collect()
    }

    /// First device whose name prefixes `requested`
    pub fn find_device(&self, requested: &str) -> Option<PrinterDevice> {
        self.list_devices()
            .into_iter()
            .find(|device| device.identity.matches(requested))
    }

    /// First listed device
    pub fn first_device(&self) -> Option<PrinterDevice> {
        self.list_devices().into_iter().next()
    }

    /// Check if a VID/PID pair is allowed by the filters
    pub fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
        // If no filters are defined, all devices are allowed
        if filters.is_empty() {
            return true;
        }

        filters.iter().any(|filter| {
            // Filter format: "0xVID:0xPID" or "0xVID:*", validated by the config loader
            let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
                return false;
            };
            id_matches(filter_vid, vid) && id_matches(filter_pid, pid)
        })
    }
}

fn id_matches(pattern: &str, id: u16) -> bool {
    if pattern == "*" {
        return true;
    }
    let hex = pattern
        .strip_prefix("0x")
        .or_else(|| pattern.strip_prefix("0X"))
        .unwrap_or(pattern);
    u16::from_str_radix(hex, 16).is_ok_and(|value| value == id)
}

fn is_root_hub(device: &PrinterDevice) -> bool {
    device.identity.vendor_id == ROOT_HUB_VENDOR && device.class_code == HUB_CLASS
}
