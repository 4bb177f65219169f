//! In-memory USB host for tests
//!
//! [`FakeHost`] implements [`UsbHost`] over a shared, inspectable state: the
//! device list, which devices are denied, queued permission listeners, and a
//! log of every connection operation in order.

use crate::usb::host::{UsbConnection, UsbHost};
use crate::usb::permission::PermissionListener;
use common::{DeviceIdentity, PrinterDevice};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded USB operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbOp {
    RequestPermission(String),
    Open(String),
    Claim { interface: u8, force: bool },
    Write {
        endpoint: u8,
        data: Vec<u8>,
        timeout: Duration,
    },
    Release(u8),
    Close,
}

#[derive(Default)]
struct FakeState {
    devices: Vec<PrinterDevice>,
    list_error: Option<rusb::Error>,
    denied: HashSet<String>,
    request_error: Option<rusb::Error>,
    listeners: Vec<PermissionListener>,
    open_error: Option<rusb::Error>,
    claim_error: Option<rusb::Error>,
    write_error: Option<rusb::Error>,
    write_limit: Option<usize>,
    write_delay: Option<Duration>,
    ops: Vec<UsbOp>,
}

/// Scriptable USB host
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHost {
    pub fn with_devices(devices: Vec<PrinterDevice>) -> Self {
        let host = Self::default();
        host.state().devices = devices;
        host
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make device listing fail
    pub fn fail_listing(&self, error: rusb::Error) {
        self.state().list_error = Some(error);
    }

    /// Withhold permission for a device name
    pub fn deny(&self, name: &str) {
        self.state().denied.insert(name.to_string());
    }

    /// Make permission requests fail before a listener is registered
    pub fn fail_permission_requests(&self, error: rusb::Error) {
        self.state().request_error = Some(error);
    }

    pub fn fail_open(&self, error: rusb::Error) {
        self.state().open_error = Some(error);
    }

    pub fn fail_claim(&self, error: rusb::Error) {
        self.state().claim_error = Some(error);
    }

    pub fn fail_write(&self, error: rusb::Error) {
        self.state().write_error = Some(error);
    }

    /// Cap the number of bytes a write reports as accepted
    pub fn limit_writes(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    /// Make every write take this long
    pub fn delay_writes(&self, delay: Duration) {
        self.state().write_delay = Some(delay);
    }

    /// Answer every queued permission request; returns how many were answered
    pub fn resolve_permission_requests(&self, granted: bool) -> usize {
        let listeners = {
            let mut state = self.state();
            let listeners: Vec<_> = state.listeners.drain(..).collect();
            if granted {
                for listener in &listeners {
                    state.denied.remove(&listener.device().name);
                }
            }
            listeners
        };

        let count = listeners.len();
        for listener in listeners {
            listener.deliver(granted);
        }
        count
    }

    /// Every operation recorded so far
    pub fn ops(&self) -> Vec<UsbOp> {
        self.state().ops.clone()
    }

    /// Payloads written, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                UsbOp::Write { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether any connection was ever opened
    pub fn opened(&self) -> bool {
        self.state()
            .ops
            .iter()
            .any(|op| matches!(op, UsbOp::Open(_)))
    }
}

impl UsbHost for FakeHost {
    type Connection = FakeConnection;

    fn devices(&self) -> Result<Vec<PrinterDevice>, rusb::Error> {
        let state = self.state();
        if let Some(error) = state.list_error {
            return Err(error);
        }
        Ok(state
            .devices
            .iter()
            .cloned()
            .map(|mut device| {
                device.permission_granted = !state.denied.contains(&device.identity.name);
                device
            })
            .collect())
    }

    fn has_permission(&self, device: &DeviceIdentity) -> bool {
        !self.state().denied.contains(&device.name)
    }

    fn request_permission(
        &self,
        device: &DeviceIdentity,
        listener: PermissionListener,
    ) -> Result<(), rusb::Error> {
        let mut state = self.state();
        state.ops.push(UsbOp::RequestPermission(device.name.clone()));
        if let Some(error) = state.request_error {
            return Err(error);
        }
        state.listeners.push(listener);
        Ok(())
    }

    fn open(&self, device: &DeviceIdentity) -> Result<FakeConnection, rusb::Error> {
        let mut state = self.state();
        state.ops.push(UsbOp::Open(device.name.clone()));
        if state.denied.contains(&device.name) {
            return Err(rusb::Error::Access);
        }
        if let Some(error) = state.open_error {
            return Err(error);
        }
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`FakeHost`]
pub struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UsbConnection for FakeConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> Result<(), rusb::Error> {
        let mut state = self.state();
        state.ops.push(UsbOp::Claim { interface, force });
        match state.claim_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        let delay = self.state().write_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        state.ops.push(UsbOp::Write {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        if let Some(error) = state.write_error {
            return Err(error);
        }
        Ok(state.write_limit.map_or(data.len(), |limit| data.len().min(limit)))
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.state().ops.push(UsbOp::Release(interface));
        Ok(())
    }

    fn close(self) {
        self.state().ops.push(UsbOp::Close);
    }
}
