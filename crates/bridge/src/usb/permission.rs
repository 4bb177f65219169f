//! USB permission gate
//!
//! Access is checked first; only when it is missing does the gate register a
//! one-shot [`PermissionListener`] and ask the host. The caller gets
//! [`PermissionStatus::Pending`] back immediately and either polls again or
//! watches for [`UsbEvent::PermissionResult`].

use crate::usb::host::UsbHost;
use common::{DeviceIdentity, EventSender, PermissionStatus, PrintError, TransferStage, UsbEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Devices with a permission request still waiting for an answer
///
/// Shared between the gate and every outstanding listener; a device leaves
/// the set when its listener delivers.
#[derive(Debug, Clone, Default)]
pub struct PendingPermissions {
    devices: Arc<Mutex<HashSet<String>>>,
}

impl PendingPermissions {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a request as outstanding; `false` if one already is
    fn begin(&self, device: &DeviceIdentity) -> bool {
        self.lock().insert(device.name.clone())
    }

    fn finish(&self, device: &DeviceIdentity) {
        self.lock().remove(&device.name);
    }

    #[cfg(test)]
    fn contains(&self, device: &DeviceIdentity) -> bool {
        self.lock().contains(&device.name)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// One-shot receiver for a permission answer
///
/// Delivering consumes the listener, so an answer is reported at most once.
pub struct PermissionListener {
    device: DeviceIdentity,
    events: EventSender,
    pending: PendingPermissions,
}

impl PermissionListener {
    pub fn new(device: DeviceIdentity, events: EventSender, pending: PendingPermissions) -> Self {
        Self {
            device,
            events,
            pending,
        }
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    /// Report the answer and publish it on the event channel
    pub fn deliver(self, granted: bool) {
        info!("USB permission granted: {} ({})", granted, self.device);
        self.pending.finish(&self.device);
        self.events.send(UsbEvent::PermissionResult {
            device: self.device,
            granted,
        });
    }
}

/// Return `Granted` right away, or issue a request and return `Pending`
///
/// While a request for the device is outstanding, further calls return
/// `Pending` without asking the host again.
pub fn check_or_request<H: UsbHost>(
    host: &H,
    device: &DeviceIdentity,
    events: &EventSender,
    pending: &PendingPermissions,
) -> Result<PermissionStatus, PrintError> {
    if host.has_permission(device) {
        debug!("Permission already granted for {}", device);
        return Ok(PermissionStatus::Granted);
    }

    if !pending.begin(device) {
        debug!("Permission request already pending for {}", device);
        return Ok(PermissionStatus::Pending);
    }

    let listener = PermissionListener::new(device.clone(), events.clone(), pending.clone());
    if let Err(e) = host.request_permission(device, listener) {
        pending.finish(device);
        return Err(PrintError::Usb {
            stage: TransferStage::RequestPermission,
            message: e.to_string(),
        });
    }

    debug!("Permission requested for {}", device);
    Ok(PermissionStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeHost, UsbOp};
    use common::create_usb_bridge;
    use common::test_utils::create_mock_receipt_printer;

    #[test]
    fn test_granted_skips_request() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        let (_bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();

        let status = check_or_request(&host, &printer.identity, &worker.event_sender(), &pending);
        assert_eq!(status, Ok(PermissionStatus::Granted));
        assert!(host.ops().is_empty());
    }

    #[test]
    fn test_missing_permission_is_pending() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        host.deny(&printer.identity.name);
        let (bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();

        let status = check_or_request(&host, &printer.identity, &worker.event_sender(), &pending);
        assert_eq!(status, Ok(PermissionStatus::Pending));
        assert_eq!(
            host.ops(),
            vec![UsbOp::RequestPermission(printer.identity.name.clone())]
        );
        assert!(bridge.try_recv_event().is_none());

        assert_eq!(host.resolve_permission_requests(true), 1);
        assert!(matches!(
            bridge.try_recv_event(),
            Some(UsbEvent::PermissionResult { granted: true, .. })
        ));
        assert!(host.has_permission(&printer.identity));
    }

    #[test]
    fn test_denied_answer_is_published() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        host.deny(&printer.identity.name);
        let (bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();

        check_or_request(&host, &printer.identity, &worker.event_sender(), &pending).unwrap();
        host.resolve_permission_requests(false);

        assert!(matches!(
            bridge.try_recv_event(),
            Some(UsbEvent::PermissionResult { granted: false, .. })
        ));
        assert!(!host.has_permission(&printer.identity));
    }

    #[test]
    fn test_repeated_requests_share_one_listener() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        host.deny(&printer.identity.name);
        let (bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();
        let events = worker.event_sender();

        for _ in 0..5 {
            let status = check_or_request(&host, &printer.identity, &events, &pending);
            assert_eq!(status, Ok(PermissionStatus::Pending));
        }
        assert!(pending.contains(&printer.identity));

        assert_eq!(host.resolve_permission_requests(true), 1);
        assert!(pending.is_empty());
        assert!(bridge.try_recv_event().is_some());
        assert!(bridge.try_recv_event().is_none());
    }

    #[test]
    fn test_new_request_after_answer() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        host.deny(&printer.identity.name);
        let (_bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();
        let events = worker.event_sender();

        check_or_request(&host, &printer.identity, &events, &pending).unwrap();
        assert_eq!(host.resolve_permission_requests(false), 1);

        check_or_request(&host, &printer.identity, &events, &pending).unwrap();
        let requests = host
            .ops()
            .iter()
            .filter(|op| matches!(op, UsbOp::RequestPermission(_)))
            .count();
        assert_eq!(requests, 2);
    }

    #[test]
    fn test_failed_request_is_not_left_pending() {
        let printer = create_mock_receipt_printer(1, 2);
        let host = FakeHost::with_devices(vec![printer.clone()]);
        host.deny(&printer.identity.name);
        host.fail_permission_requests(rusb::Error::Other);
        let (_bridge, worker) = create_usb_bridge();
        let pending = PendingPermissions::default();

        let status = check_or_request(&host, &printer.identity, &worker.event_sender(), &pending);
        assert!(matches!(
            status,
            Err(PrintError::Usb {
                stage: TransferStage::RequestPermission,
                ..
            })
        ));
        assert!(pending.is_empty());
    }
}
