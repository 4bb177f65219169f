//! Printer method channel
//!
//! The request surface: five named methods that answer with a boolean or a
//! device list. Every failure collapses to `false` plus a log line; the typed
//! [`PrintError`] never reaches the caller. [`PrinterChannel::handle_json`]
//! serves the same methods over one-line JSON envelopes.

use common::{
    JobOutcome, PermissionStatus, PrintError, PrinterDevice, UsbBridge, UsbCommand, UsbEvent,
};
use protocol::{JobId, PrintJob};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Error string for a method name nobody handles
pub const NOT_IMPLEMENTED: &str = "notImplemented";

/// Error string for a line that is not a method-call envelope
pub const INVALID_REQUEST: &str = "invalidRequest";

/// Arguments of a method call
///
/// Every field is optional on the wire; missing strings are read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodArgs {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub text: Option<String>,
    pub device_name: Option<String>,
}

/// A parsed method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    RequestUsbPermission {
        device_name: Option<String>,
    },
    GetUsbDevices,
    PrintBarcodeWithName {
        name: String,
        barcode: String,
        device_name: String,
    },
    PrintReceipt {
        text: String,
        device_name: String,
    },
    OpenCashDrawer {
        device_name: String,
    },
}

impl MethodCall {
    /// Build a call from a method name; `None` for unknown methods
    pub fn parse(method: &str, args: MethodArgs) -> Option<Self> {
        let call = match method {
            "requestUsbPermission" => Self::RequestUsbPermission {
                device_name: args.device_name,
            },
            "getUsbDevices" => Self::GetUsbDevices,
            "printBarcodeWithName" => Self::PrintBarcodeWithName {
                name: args.name.unwrap_or_default(),
                barcode: args.barcode.unwrap_or_default(),
                device_name: args.device_name.unwrap_or_default(),
            },
            "printReceipt" => Self::PrintReceipt {
                text: args.text.unwrap_or_default(),
                device_name: args.device_name.unwrap_or_default(),
            },
            "openCashDrawer" => Self::OpenCashDrawer {
                device_name: args.device_name.unwrap_or_default(),
            },
            _ => return None,
        };
        Some(call)
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::RequestUsbPermission { .. } => "requestUsbPermission",
            Self::GetUsbDevices => "getUsbDevices",
            Self::PrintBarcodeWithName { .. } => "printBarcodeWithName",
            Self::PrintReceipt { .. } => "printReceipt",
            Self::OpenCashDrawer { .. } => "openCashDrawer",
        }
    }
}

/// Result of a method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodResult {
    Bool(bool),
    Devices(Vec<String>),
}

/// JSON method-call envelope
#[derive(Debug, Clone, Deserialize)]
pub struct MethodRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub args: Option<MethodArgs>,
}

/// JSON response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MethodResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MethodResponse {
    fn result(id: Option<Value>, result: MethodResult) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, error: &str) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Async handle that turns method calls into USB worker commands
#[derive(Clone)]
pub struct PrinterChannel {
    bridge: UsbBridge,
}

impl PrinterChannel {
    pub fn new(bridge: UsbBridge) -> Self {
        Self { bridge }
    }

    /// `true` if the device is already accessible
    ///
    /// Otherwise a request is issued and `false` is returned right away; the
    /// answer arrives later as [`UsbEvent::PermissionResult`].
    pub async fn request_usb_permission(&self, device_name: Option<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        let cmd = UsbCommand::RequestPermission {
            device_name,
            response: tx,
        };

        match self.roundtrip(cmd, rx).await {
            Ok(Ok(PermissionStatus::Granted)) => true,
            Ok(Ok(PermissionStatus::Pending)) => {
                debug!("USB permission requested, waiting for the host");
                false
            }
            Ok(Err(e)) | Err(e) => {
                warn!("requestUsbPermission failed: {}", e);
                false
            }
        }
    }

    /// Identity strings of every attached device
    pub async fn get_usb_devices(&self) -> Vec<String> {
        self.list_devices()
            .await
            .iter()
            .map(|device| device.identity.identity_string())
            .collect()
    }

    /// Full device snapshots, for callers that want more than identity strings
    pub async fn list_devices(&self) -> Vec<PrinterDevice> {
        let (tx, rx) = oneshot::channel();
        match self
            .roundtrip(UsbCommand::ListDevices { response: tx }, rx)
            .await
        {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to list USB devices: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn print_barcode_with_name(
        &self,
        name: &str,
        barcode: &str,
        device_name: &str,
    ) -> bool {
        let job = PrintJob::Label {
            name: name.to_string(),
            barcode: barcode.to_string(),
        };
        self.submit(device_name, job).await
    }

    pub async fn print_receipt(&self, text: &str, device_name: &str) -> bool {
        let job = PrintJob::Receipt {
            text: text.to_string(),
        };
        self.submit(device_name, job).await
    }

    pub async fn open_cash_drawer(&self, device_name: &str) -> bool {
        self.submit(device_name, PrintJob::DrawerKick).await
    }

    /// Queue a job and return once the worker accepts or rejects it
    ///
    /// The transfer outcome is only logged.
    pub async fn submit(&self, device_name: &str, job: PrintJob) -> bool {
        let kind = job.kind();
        let (accepted, outcome) = match self.enqueue(device_name, job).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{} rejected for {:?}: {}", kind, device_name, e);
                return false;
            }
        };

        tokio::spawn(async move {
            match outcome.await {
                Ok(Ok(written)) => info!("{} {} success: {} bytes", kind, accepted, written),
                Ok(Err(e)) => error!("{} {} failed: {}", kind, accepted, e),
                Err(_) => error!("{} {} dropped by the USB worker", kind, accepted),
            }
        });

        true
    }

    /// Queue a job and wait for the transfer outcome
    pub async fn submit_and_wait(&self, device_name: &str, job: PrintJob) -> JobOutcome {
        let (_, outcome) = self.enqueue(device_name, job).await?;
        outcome.await.map_err(|_| PrintError::WorkerUnavailable)?
    }

    /// Next event from the USB worker; `None` once the worker is gone
    pub async fn next_event(&self) -> Option<UsbEvent> {
        self.bridge.recv_event().await.ok()
    }

    /// Dispatch a parsed method call
    pub async fn call(&self, call: MethodCall) -> MethodResult {
        debug!("Method call: {}", call.method_name());
        match call {
            MethodCall::RequestUsbPermission { device_name } => {
                MethodResult::Bool(self.request_usb_permission(device_name).await)
            }
            MethodCall::GetUsbDevices => MethodResult::Devices(self.get_usb_devices().await),
            MethodCall::PrintBarcodeWithName {
                name,
                barcode,
                device_name,
            } => MethodResult::Bool(
                self.print_barcode_with_name(&name, &barcode, &device_name)
                    .await,
            ),
            MethodCall::PrintReceipt { text, device_name } => {
                MethodResult::Bool(self.print_receipt(&text, &device_name).await)
            }
            MethodCall::OpenCashDrawer { device_name } => {
                MethodResult::Bool(self.open_cash_drawer(&device_name).await)
            }
        }
    }

    pub async fn handle_request(&self, request: MethodRequest) -> MethodResponse {
        let args = request.args.unwrap_or_default();
        match MethodCall::parse(&request.method, args) {
            Some(call) => MethodResponse::result(request.id, self.call(call).await),
            None => {
                warn!("Unknown method: {}", request.method);
                MethodResponse::error(request.id, NOT_IMPLEMENTED)
            }
        }
    }

    /// Handle one line of JSON
    pub async fn handle_json(&self, line: &str) -> MethodResponse {
        match serde_json::from_str::<MethodRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("Invalid method call: {}", e);
                MethodResponse::error(None, INVALID_REQUEST)
            }
        }
    }

    async fn enqueue(
        &self,
        device_name: &str,
        job: PrintJob,
    ) -> Result<(JobId, oneshot::Receiver<JobOutcome>), PrintError> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cmd = UsbCommand::SubmitJob {
            device_name: device_name.to_string(),
            job,
            accepted: accepted_tx,
            outcome: Some(outcome_tx),
        };

        let job_id = self.roundtrip(cmd, accepted_rx).await??;
        Ok((job_id, outcome_rx))
    }

    /// Send a command and wait for its reply
    async fn roundtrip<T>(
        &self,
        cmd: UsbCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, PrintError> {
        self.bridge.send_command(cmd).await.map_err(|e| {
            error!("USB worker unreachable: {}", e);
            PrintError::WorkerUnavailable
        })?;
        rx.await.map_err(|_| PrintError::WorkerUnavailable)
    }
}
