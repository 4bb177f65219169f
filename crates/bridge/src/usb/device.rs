//! libusb-backed USB host
//!
//! This module wraps `rusb` to provide [`UsbHost`]: descriptor snapshots for
//! enumeration, an open-probe permission model, and connections that detach
//! and restore kernel drivers around a claim.

use crate::usb::host::{UsbConnection, UsbHost};
use crate::usb::permission::PermissionListener;
use common::{DeviceIdentity, EndpointInfo, InterfaceInfo, PrinterDevice, TransferKind};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a pending permission request is watched
///
/// libusb has no permission prompt: access is decided by device node
/// ownership (udev rules, group membership). A request keeps probing the
/// device until it opens or the timeout passes.
#[derive(Debug, Clone, Copy)]
pub struct PermissionPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PermissionPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(30),
        }
    }
}

/// USB host on top of a libusb context
pub struct LibusbHost {
    context: Context,
    polling: PermissionPolling,
}

impl LibusbHost {
    /// Create a new libusb context
    pub fn new(polling: PermissionPolling) -> Result<Self, rusb::Error> {
        Ok(Self {
            context: Context::new()?,
            polling,
        })
    }

    /// Locate the live device for an identity by bus and address
    fn find(&self, identity: &DeviceIdentity) -> Result<Device<Context>, rusb::Error> {
        find_device(&self.context, identity)
    }

    /// Build a snapshot of one device
    fn snapshot(&self, device: &Device<Context>) -> Result<PrinterDevice, rusb::Error> {
        let descriptor = device.device_descriptor()?;
        let identity = DeviceIdentity::new(
            device.bus_number(),
            device.address(),
            descriptor.vendor_id(),
            descriptor.product_id(),
        );

        // Opening doubles as the permission probe
        let (permission_granted, manufacturer, product) = match device.open() {
            Ok(handle) => {
                let (manufacturer, product) = read_string_descriptors(&handle, &descriptor);
                (true, manufacturer, product)
            }
            Err(e) => {
                debug!("Cannot open {}: {}", identity, e);
                (false, None, None)
            }
        };

        let interfaces = match device.active_config_descriptor() {
            Ok(config) => config
                .interfaces()
                .filter_map(|interface| {
                    let alt = interface.descriptors().next()?;
                    Some(InterfaceInfo {
                        number: interface.number(),
                        class_code: alt.class_code(),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| {
                                let kind = map_transfer_kind(ep.transfer_type());
                                EndpointInfo::new(ep.address(), kind)
                            })
                            .collect(),
                    })
                })
                .collect(),
            Err(e) => {
                debug!("No active configuration for {}: {}", identity, e);
                Vec::new()
            }
        };

        Ok(PrinterDevice {
            identity,
            class_code: descriptor.class_code(),
            manufacturer,
            product,
            interfaces,
            permission_granted,
        })
    }
}

impl UsbHost for LibusbHost {
    type Connection = LibusbConnection;

    fn devices(&self) -> Result<Vec<PrinterDevice>, rusb::Error> {
        let devices = self.context.devices()?;

        let mut snapshots = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            match self.snapshot(&device) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(
                    "Failed to read device bus={}, addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("Enumerated {} devices", snapshots.len());
        Ok(snapshots)
    }

    fn has_permission(&self, device: &DeviceIdentity) -> bool {
        can_open(&self.context, device)
    }

    fn request_permission(
        &self,
        device: &DeviceIdentity,
        listener: PermissionListener,
    ) -> Result<(), rusb::Error> {
        let context = self.context.clone();
        let identity = device.clone();
        let polling = self.polling;

        std::thread::Builder::new()
            .name("usb-permission".to_string())
            .spawn(move || {
                let deadline = Instant::now() + polling.timeout;
                loop {
                    if can_open(&context, &identity) {
                        listener.deliver(true);
                        return;
                    }
                    if Instant::now() >= deadline {
                        listener.deliver(false);
                        return;
                    }
                    std::thread::sleep(polling.interval);
                }
            })
            .map_err(|e| {
                warn!("Failed to spawn permission watcher: {}", e);
                rusb::Error::Other
            })?;

        Ok(())
    }

    fn open(&self, device: &DeviceIdentity) -> Result<LibusbConnection, rusb::Error> {
        let handle = self.find(device)?.open()?;
        debug!("Opened device {}", device);

        Ok(LibusbConnection {
            handle,
            name: device.name.clone(),
            detached: Vec::new(),
        })
    }
}

/// Open libusb device handle
pub struct LibusbConnection {
    handle: DeviceHandle<Context>,
    name: String,
    /// Interfaces whose kernel driver we detached
    detached: Vec<u8>,
}

impl UsbConnection for LibusbConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<(), rusb::Error> {
        if force {
            match self.handle.kernel_driver_active(interface) {
                Ok(true) => {
                    debug!(
                        "Detaching kernel driver from interface {} on {}",
                        interface, self.name
                    );
                    match self.handle.detach_kernel_driver(interface) {
                        Ok(()) => self.detached.push(interface),
                        // Claiming will report the real failure
                        Err(e) => warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            interface, e
                        ),
                    }
                }
                Ok(false) => {
                    debug!("No kernel driver active on interface {}", interface);
                }
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        interface, e
                    );
                }
            }
        }

        self.handle.claim_interface(interface)?;
        debug!("Claimed interface {} on {}", interface, self.name);
        Ok(())
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.handle.write_bulk(endpoint, data, timeout)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        let released = self.handle.release_interface(interface);

        if let Some(pos) = self.detached.iter().position(|&i| i == interface) {
            self.detached.remove(pos);
            if let Err(e) = self.handle.attach_kernel_driver(interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    interface, e
                );
            } else {
                debug!(
                    "Reattached kernel driver to interface {} on {}",
                    interface, self.name
                );
            }
        }

        released
    }

    fn close(self) {
        debug!("Closed device {}", self.name);
    }
}

fn find_device(
    context: &Context,
    identity: &DeviceIdentity,
) -> Result<Device<Context>, rusb::Error> {
    context
        .devices()?
        .iter()
        .find(|device| {
            device.bus_number() == identity.bus_number && device.address() == identity.address
        })
        .ok_or(rusb::Error::NoDevice)
}

fn can_open(context: &Context, identity: &DeviceIdentity) -> bool {
    match find_device(context, identity).and_then(|device| device.open()) {
        Ok(_) => true,
        Err(rusb::Error::Access) => false,
        Err(e) => {
            debug!("Permission probe for {} failed: {}", identity, e);
            false
        }
    }
}

/// Read manufacturer and product strings
fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product)
}

/// Map rusb transfer type to the descriptor snapshot kind
fn map_transfer_kind(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_transfer_kind() {
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Bulk),
            TransferKind::Bulk
        );
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Interrupt),
            TransferKind::Interrupt
        );
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Control),
            TransferKind::Control
        );
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Isochronous),
            TransferKind::Isochronous
        );
    }

    #[test]
    fn test_default_polling() {
        let polling = PermissionPolling::default();
        assert!(polling.interval < polling.timeout);
    }

    #[test]
    fn test_libusb_host_creation() {
        // Context creation may fail in sandboxes without USB support
        match LibusbHost::new(PermissionPolling::default()) {
            Ok(host) => {
                let _ = host.devices();
            }
            Err(e) => {
                eprintln!("libusb context unavailable (expected without USB): {}", e);
            }
        }
    }
}
