//! Async channel bridge between the request surface and the USB thread

use crate::error::PrintError;
use crate::usb_types::{DeviceIdentity, PermissionStatus, PrinterDevice};
use async_channel::{Receiver, Sender, TrySendError, bounded};
use protocol::{JobId, PrintJob};
use tokio::sync::oneshot;
use tracing::warn;

/// Bytes written on success, or why the job failed
pub type JobOutcome = Result<usize, PrintError>;

/// Commands from the async side to the USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// List attached devices
    ListDevices {
        /// Channel to send response back
        response: oneshot::Sender<Vec<PrinterDevice>>,
    },

    /// Check or request access to a device
    RequestPermission {
        /// Device name prefix; `None` selects the first attached device
        device_name: Option<String>,
        /// Channel to send response back
        response: oneshot::Sender<Result<PermissionStatus, PrintError>>,
    },

    /// Queue a print or drawer job
    SubmitJob {
        /// Requested device name, matched by prefix
        device_name: String,
        /// Job to run
        job: PrintJob,
        /// Answered once the device is found and access is confirmed
        accepted: oneshot::Sender<Result<JobId, PrintError>>,
        /// Answered after the transfer, if the caller wants to wait for it
        outcome: Option<oneshot::Sender<JobOutcome>>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// Events published by the USB thread
#[derive(Debug, Clone)]
pub enum UsbEvent {
    /// Answer to an earlier permission request
    PermissionResult {
        device: DeviceIdentity,
        granted: bool,
    },

    /// A queued job finished
    JobFinished {
        job_id: JobId,
        device: DeviceIdentity,
        kind: &'static str,
        outcome: JobOutcome,
    },
}

/// Handle for the async side
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
    event_rx: Receiver<UsbEvent>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<UsbEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take an already queued event without waiting
    pub fn try_recv_event(&self) -> Option<UsbEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Handle for the USB thread (blocking)
pub struct UsbWorker {
    cmd_rx: Receiver<UsbCommand>,
    event_tx: Sender<UsbEvent>,
}

impl UsbWorker {
    /// Receive a command (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Event sender for helper threads (transfers, permission watchers)
    pub fn event_sender(&self) -> EventSender {
        EventSender {
            tx: self.event_tx.clone(),
        }
    }
}

/// Cloneable event publisher detached from the worker
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<UsbEvent>,
}

impl EventSender {
    pub fn send(&self, event: UsbEvent) {
        publish(&self.tx, event);
    }
}

/// Events are advisory: a full queue drops the event instead of stalling
/// transfers when nobody is listening.
fn publish(tx: &Sender<UsbEvent>, event: UsbEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!("Event queue full, dropping {:?}", event);
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Create the channel bridge between the async side and the USB thread
///
/// Returns (UsbBridge for async callers, UsbWorker for the USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = bounded(256);

    (
        UsbBridge { cmd_tx, event_rx },
        UsbWorker { cmd_rx, event_tx },
    )
}
