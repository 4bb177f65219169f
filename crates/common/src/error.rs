//! Common error types

use protocol::EncodeError;
use std::fmt;
use thiserror::Error;

/// Plumbing errors (channels, logging setup, I/O)
#[derive(Debug, Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Step of the USB conversation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    RequestPermission,
    Open,
    ClaimInterface,
    Write,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TransferStage::RequestPermission => "permission request",
            TransferStage::Open => "open",
            TransferStage::ClaimInterface => "claim interface",
            TransferStage::Write => "bulk write",
        };
        f.write_str(stage)
    }
}

/// Why a print or drawer request did not reach the printer
///
/// The request surface only reports a boolean; this type carries the detail
/// into log lines and `JobFinished` events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintError {
    #[error("No USB device attached")]
    NoDeviceAttached,

    #[error("No USB device matches {requested:?}")]
    DeviceNotFound { requested: String },

    #[error("USB permission not granted for {device}")]
    PermissionDenied { device: String },

    #[error("No bulk OUT endpoint on {device}")]
    NoBulkOutEndpoint { device: String },

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("USB {stage} failed: {message}")]
    Usb {
        stage: TransferStage,
        message: String,
    },

    #[error("Bulk transfer wrote no bytes")]
    NothingWritten,

    #[error("USB worker unavailable")]
    WorkerUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_error_display() {
        let err = PrintError::Usb {
            stage: TransferStage::ClaimInterface,
            message: "Resource busy".to_string(),
        };
        assert_eq!(err.to_string(), "USB claim interface failed: Resource busy");
    }

    #[test]
    fn test_encode_error_conversion() {
        let err: PrintError = EncodeError::EmptyBarcode.into();
        assert!(matches!(err, PrintError::Encode(EncodeError::EmptyBarcode)));
    }
}
