//! USB printer bridge
//!
//! Drives USB label printers (TSPL), receipt printers and cash drawers
//! (ESC/POS) through libusb. The [`methods`] module is the request surface,
//! [`usb`] owns the device side, and [`config`] loads the TOML settings that
//! tie them together.

pub mod config;
pub mod methods;
pub mod usb;

#[cfg(test)]
mod test_utils;

pub use config::BridgeConfig;
pub use methods::{MethodCall, PrinterChannel};
