//! USB subsystem
//!
//! Device enumeration, the permission gate, endpoint resolution, and transfer
//! execution. Everything that touches the USB stack runs on dedicated
//! worker threads so the Tokio runtime never blocks on libusb.

pub mod device;
pub mod endpoint;
pub mod host;
pub mod manager;
pub mod permission;
pub mod transfers;
pub mod worker;

pub use device::{LibusbHost, PermissionPolling};
pub use endpoint::resolve_bulk_out;
pub use host::{UsbConnection, UsbHost};
pub use manager::DeviceManager;
pub use permission::{PendingPermissions, PermissionListener};
pub use transfers::{TransferTimeouts, send_payload};
pub use worker::{TransferThread, UsbWorkerThread, WorkerSettings, spawn_usb_worker};
