//! Print job definitions
//!
//! A [`PrintJob`] is built per request, encoded once and handed to the USB
//! worker. Jobs are never persisted.

use crate::error::Result;
use crate::escpos::{self, DrawerPulse, ReceiptOptions};
use crate::tspl::{self, LabelLayout};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker-assigned job identifier
///
/// Used to correlate the asynchronous completion event with the request that
/// queued the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Printer command language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Label printers
    Tspl,
    /// Receipt printers and the cash drawer port behind them
    EscPos,
}

/// One unit of work for a printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrintJob {
    /// Sheet of barcode stickers with a product caption
    Label { name: String, barcode: String },
    /// Plain text receipt
    Receipt { text: String },
    /// Pulse the cash drawer solenoid
    DrawerKick,
}

impl PrintJob {
    /// Command language the job is encoded in
    pub fn dialect(&self) -> Dialect {
        match self {
            PrintJob::Label { .. } => Dialect::Tspl,
            PrintJob::Receipt { .. } | PrintJob::DrawerKick => Dialect::EscPos,
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            PrintJob::Label { .. } => "label",
            PrintJob::Receipt { .. } => "receipt",
            PrintJob::DrawerKick => "drawer_kick",
        }
    }

    /// Whether the job moves paper (as opposed to kicking the drawer)
    pub fn is_print(&self) -> bool {
        !matches!(self, PrintJob::DrawerKick)
    }

    /// Encode the job into raw printer bytes
    pub fn encode(&self, settings: &EncoderSettings) -> Result<Bytes> {
        match self {
            PrintJob::Label { name, barcode } => tspl::encode_label(&settings.label, name, barcode),
            PrintJob::Receipt { text } => Ok(escpos::encode_receipt(text, &settings.receipt)),
            PrintJob::DrawerKick => escpos::encode_drawer_kick(&settings.drawer),
        }
    }
}

/// Encoder configuration for all job kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    #[serde(default)]
    pub label: LabelLayout,
    #[serde(default)]
    pub receipt: ReceiptOptions,
    #[serde(default)]
    pub drawer: DrawerPulse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialects() {
        let label = PrintJob::Label {
            name: "a".into(),
            barcode: "1".into(),
        };
        assert_eq!(label.dialect(), Dialect::Tspl);
        assert_eq!(
            PrintJob::Receipt { text: "a".into() }.dialect(),
            Dialect::EscPos
        );
        assert_eq!(PrintJob::DrawerKick.dialect(), Dialect::EscPos);
    }

    #[test]
    fn test_is_print() {
        assert!(PrintJob::Receipt { text: String::new() }.is_print());
        assert!(!PrintJob::DrawerKick.is_print());
    }

    #[test]
    fn test_encode_dispatch() {
        let settings = EncoderSettings::default();
        let drawer = PrintJob::DrawerKick.encode(&settings).unwrap();
        assert_eq!(drawer.as_ref(), &[0x1B, 0x70, 0x00, 0x19, 0xFA]);

        let receipt = PrintJob::Receipt { text: "ok".into() }
            .encode(&settings)
            .unwrap();
        assert_eq!(receipt.as_ref(), b"ok\n\n\n");

        let label = PrintJob::Label {
            name: "Teh".into(),
            barcode: "42".into(),
        }
        .encode(&settings)
        .unwrap();
        assert!(label.starts_with(b"SIZE 800,1200\r\n"));
        assert!(label.ends_with(b"PRINT 1,1\r\n"));
    }

    #[test]
    fn test_job_serde_shape() {
        let job = PrintJob::Label {
            name: "Teh".into(),
            barcode: "42".into(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "label");
        assert_eq!(json["barcode"], "42");

        let parsed: PrintJob = serde_json::from_str(r#"{"kind":"drawer_kick"}"#).unwrap();
        assert_eq!(parsed, PrintJob::DrawerKick);
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(7).to_string(), "#7");
    }
}
