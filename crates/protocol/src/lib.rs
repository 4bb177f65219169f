//! Printer command library for usb-printer-bridge
//!
//! This crate turns print jobs into the raw bytes a USB printer expects. Two
//! command dialects are supported:
//!
//! - **TSPL** for barcode label printers ([`tspl`])
//! - **ESC/POS** for receipt printers and their cash drawer port ([`escpos`])
//!
//! Encoding is pure and deterministic: the same job and settings always
//! produce the same bytes.
//!
//! # Example
//!
//! ```
//! use protocol::{EncoderSettings, PrintJob};
//!
//! let job = PrintJob::Receipt {
//!     text: "Thank you".to_string(),
//! };
//! let bytes = job.encode(&EncoderSettings::default()).unwrap();
//! assert_eq!(&bytes[..], b"Thank you\n\n\n");
//! ```

pub mod error;
pub mod escpos;
pub mod job;
pub mod tspl;

pub use error::{EncodeError, Result};
pub use escpos::{DrawerPulse, ReceiptOptions, encode_drawer_kick, encode_receipt};
pub use job::{Dialect, EncoderSettings, JobId, PrintJob};
pub use tspl::{LabelLayout, Slot, encode_label, truncate_name};
