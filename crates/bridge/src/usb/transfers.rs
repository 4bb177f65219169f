//! USB transfer execution
//!
//! One payload, one connection: open, claim the printer interface, bulk
//! write, release, close. Errors from rusb are mapped to [`PrintError`] with
//! the stage that failed.

use crate::usb::endpoint::resolve_bulk_out;
use crate::usb::host::{UsbConnection, UsbHost};
use common::{JobOutcome, PrintError, PrinterDevice, TransferStage};
use std::time::Duration;
use tracing::{debug, warn};

/// Bulk write timeouts per job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTimeouts {
    /// Labels and receipts
    pub print: Duration,
    /// Cash drawer kicks
    pub drawer: Duration,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            print: Duration::from_secs(5),
            drawer: Duration::from_secs(3),
        }
    }
}

/// Write a payload to the device's bulk OUT endpoint
///
/// The interface is released and the connection closed whether or not the
/// write succeeds. Success means the device accepted at least one byte.
pub fn send_payload<H: UsbHost>(
    host: &H,
    device: &PrinterDevice,
    payload: &[u8],
    timeout: Duration,
) -> JobOutcome {
    let target =
        resolve_bulk_out(&device.interfaces).ok_or_else(|| PrintError::NoBulkOutEndpoint {
            device: device.identity.name.clone(),
        })?;

    let mut connection = host
        .open(&device.identity)
        .map_err(|e| map_rusb_error(TransferStage::Open, e))?;

    if let Err(e) = connection.claim_interface(target.interface_number, true) {
        connection.close();
        return Err(map_rusb_error(TransferStage::ClaimInterface, e));
    }

    debug!(
        "Bulk transfer: endpoint={:#x}, data_len={}, timeout={}ms",
        target.endpoint_address,
        payload.len(),
        timeout.as_millis()
    );
    let written = connection.write_bulk(target.endpoint_address, payload, timeout);

    if let Err(e) = connection.release_interface(target.interface_number) {
        warn!(
            "Failed to release interface {} on {}: {}",
            target.interface_number, device.identity.name, e
        );
    }
    connection.close();

    match written {
        Ok(0) => Err(PrintError::NothingWritten),
        Ok(len) => {
            debug!("Bulk transfer succeeded: {} of {} bytes", len, payload.len());
            Ok(len)
        }
        Err(e) => Err(map_rusb_error(TransferStage::Write, e)),
    }
}

/// Map rusb::Error to PrintError
pub fn map_rusb_error(stage: TransferStage, err: rusb::Error) -> PrintError {
    PrintError::Usb {
        stage,
        message: err.to_string(),
    }
}
