//! USB worker threads
//!
//! The command thread owns device lookup, the permission gate and encoding.
//! It accepts a job and hands the payload to a single transfer thread, so
//! listings and new submissions are answered while a bulk write is in
//! flight. Transfers run one at a time in acceptance order, so jobs never
//! interleave on the wire.

use crate::usb::host::UsbHost;
use crate::usb::manager::DeviceManager;
use crate::usb::permission::{self, PendingPermissions};
use crate::usb::transfers::{TransferTimeouts, send_payload};
use async_channel::{Receiver, Sender};
use bytes::Bytes;
use common::{
    EventSender, JobOutcome, PermissionStatus, PrintError, PrinterDevice, UsbCommand, UsbEvent,
    UsbWorker,
};
use protocol::{EncoderSettings, JobId, PrintJob};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Everything the worker needs besides the host
#[derive(Debug, Clone, Default)]
pub struct WorkerSettings {
    /// VID:PID allow-list
    pub filters: Vec<String>,
    pub encoder: EncoderSettings,
    pub timeouts: TransferTimeouts,
}

/// An accepted job waiting for the wire
struct Transfer {
    job_id: JobId,
    kind: &'static str,
    device: PrinterDevice,
    payload: Bytes,
    timeout: std::time::Duration,
    outcome: Option<oneshot::Sender<JobOutcome>>,
}

/// Command thread state
pub struct UsbWorkerThread<H: UsbHost> {
    manager: DeviceManager<H>,
    worker: UsbWorker,
    encoder: EncoderSettings,
    timeouts: TransferTimeouts,
    pending: PendingPermissions,
    transfers: Sender<Transfer>,
    next_job_id: u64,
}

/// Transfer thread state
///
/// Drains the queue until the command thread drops its sender.
pub struct TransferThread<H: UsbHost> {
    host: Arc<H>,
    queue: Receiver<Transfer>,
    events: EventSender,
}

impl<H: UsbHost> UsbWorkerThread<H> {
    /// Build the command thread and the transfer thread it feeds
    pub fn new(worker: UsbWorker, host: H, settings: WorkerSettings) -> (Self, TransferThread<H>) {
        let manager = DeviceManager::new(host, settings.filters);
        let (tx, rx) = async_channel::unbounded();
        let transfer = TransferThread {
            host: manager.shared_host(),
            queue: rx,
            events: worker.event_sender(),
        };
        let thread = Self {
            manager,
            worker,
            encoder: settings.encoder,
            timeouts: settings.timeouts,
            pending: PendingPermissions::default(),
            transfers: tx,
            next_job_id: 1,
        };
        (thread, transfer)
    }

    /// Process commands until `Shutdown` or until every bridge handle is gone
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(UsbCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("Command channel closed: {}", e);
                    break;
                }
            }
        }

        info!("USB worker thread stopped");
    }

    /// Handle a command, surviving panics in the handler
    fn handle_command(&mut self, cmd: UsbCommand) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: UsbCommand) {
        match cmd {
            UsbCommand::ListDevices { response } => {
                let devices = self.manager.list_devices();
                debug!("Listing {} devices", devices.len());
                let _ = response.send(devices);
            }

            UsbCommand::RequestPermission {
                device_name,
                response,
            } => {
                let result = self.request_permission(device_name.as_deref());
                let _ = response.send(result);
            }

            UsbCommand::SubmitJob {
                device_name,
                job,
                accepted,
                outcome,
            } => self.submit_job(&device_name, job, accepted, outcome),

            UsbCommand::Shutdown => {
                // Already handled in run loop
                unreachable!()
            }
        }
    }

    fn request_permission(
        &self,
        device_name: Option<&str>,
    ) -> Result<PermissionStatus, PrintError> {
        let device = match device_name {
            Some(name) => self
                .manager
                .find_device(name)
                .ok_or_else(|| PrintError::DeviceNotFound {
                    requested: name.to_string(),
                })?,
            None => self
                .manager
                .first_device()
                .ok_or(PrintError::NoDeviceAttached)?,
        };

        permission::check_or_request(
            self.manager.host(),
            &device.identity,
            &self.worker.event_sender(),
            &self.pending,
        )
    }

    /// Validate and accept one job, then queue it for transfer
    fn submit_job(
        &mut self,
        device_name: &str,
        job: PrintJob,
        accepted: oneshot::Sender<Result<JobId, PrintError>>,
        outcome: Option<oneshot::Sender<JobOutcome>>,
    ) {
        let prepared = self.prepare_job(device_name, &job);
        let (device, payload) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Rejected {} job for {:?}: {}", job.kind(), device_name, e);
                let _ = accepted.send(Err(e));
                return;
            }
        };

        let job_id = JobId(self.next_job_id);
        self.next_job_id += 1;

        let timeout = if job.is_print() {
            self.timeouts.print
        } else {
            self.timeouts.drawer
        };

        debug!(
            "Queueing job {} ({}, {:?}) on {}",
            job_id,
            job.kind(),
            job.dialect(),
            device.identity
        );
        let transfer = Transfer {
            job_id,
            kind: job.kind(),
            device,
            payload,
            timeout,
            outcome,
        };
        if self.transfers.try_send(transfer).is_err() {
            error!("Transfer thread is gone, rejecting job {}", job_id);
            let _ = accepted.send(Err(PrintError::WorkerUnavailable));
            return;
        }

        let _ = accepted.send(Ok(job_id));
    }

    /// Resolve the device, confirm access, and encode the payload
    ///
    /// No connection is opened unless permission is already granted.
    fn prepare_job(
        &self,
        device_name: &str,
        job: &PrintJob,
    ) -> Result<(PrinterDevice, Bytes), PrintError> {
        let device =
            self.manager
                .find_device(device_name)
                .ok_or_else(|| PrintError::DeviceNotFound {
                    requested: device_name.to_string(),
                })?;

        if !self.manager.host().has_permission(&device.identity) {
            return Err(PrintError::PermissionDenied {
                device: device.identity.name.clone(),
            });
        }

        let payload = job.encode(&self.encoder)?;
        Ok((device, payload))
    }
}

impl<H: UsbHost> TransferThread<H> {
    /// Run queued transfers until the queue closes and is empty
    pub fn run(self) {
        info!("USB transfer thread started");

        while let Ok(transfer) = self.queue.recv_blocking() {
            self.execute(transfer);
        }

        info!("USB transfer thread stopped");
    }

    /// Run one transfer and report its outcome, surviving panics
    fn execute(&self, transfer: Transfer) {
        let Transfer {
            job_id,
            kind,
            device,
            payload,
            timeout,
            outcome,
        } = transfer;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            send_payload(self.host.as_ref(), &device, &payload, timeout)
        }))
        .unwrap_or_else(|e| {
            error!("Panic in USB transfer for job {}: {:?}", job_id, e);
            Err(PrintError::WorkerUnavailable)
        });

        match &result {
            Ok(written) => info!(
                "Job {} ({}) on {} succeeded: {} bytes",
                job_id, kind, device.identity.name, written
            ),
            Err(e) => warn!(
                "Job {} ({}) on {} failed: {}",
                job_id, kind, device.identity.name, e
            ),
        }

        if let Some(outcome) = outcome {
            let _ = outcome.send(result.clone());
        }
        self.events.send(UsbEvent::JobFinished {
            job_id,
            device: device.identity,
            kind,
            outcome: result,
        });
    }

    /// Run whatever is queued right now without blocking
    #[cfg(test)]
    fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(transfer) = self.queue.try_recv() {
            self.execute(transfer);
            count += 1;
        }
        count
    }
}

/// Spawn the USB command and transfer threads
///
/// The returned handle belongs to the command thread. It runs until a
/// Shutdown command is received or every bridge handle is dropped, then
/// waits for queued transfers to finish before exiting.
pub fn spawn_usb_worker<H: UsbHost>(
    worker: UsbWorker,
    host: H,
    settings: WorkerSettings,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    let (command_thread, transfer_thread) = UsbWorkerThread::new(worker, host, settings);

    let transfer_handle = std::thread::Builder::new()
        .name("usb-transfer".to_string())
        .spawn(move || transfer_thread.run())?;

    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            // Dropping the command thread closes the transfer queue
            command_thread.run();
            if let Err(e) = transfer_handle.join() {
                error!("USB transfer thread panicked: {:?}", e);
            }
        })
}
