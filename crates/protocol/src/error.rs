//! Encoder error types

use thiserror::Error;

/// Errors raised while turning a print job into printer command bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Barcode payload is empty
    #[error("Barcode data is empty")]
    EmptyBarcode,

    /// Barcode contains a character the TSPL BARCODE directive cannot carry
    #[error("Invalid barcode character {character:?} at position {position}")]
    InvalidBarcodeCharacter { character: char, position: usize },

    /// Label layout has no slots to print into
    #[error("Label layout has no slots")]
    NoSlots,

    /// A caption position derived from a slot does not fit in a coordinate
    #[error("Label coordinates overflow for slot at ({x}, {y})")]
    CoordinateOverflow { x: u32, y: u32 },

    /// Drawer pin selector outside 0..=1
    #[error("Invalid drawer pin {0} (expected 0 or 1)")]
    InvalidDrawerPin(u8),
}

/// Type alias for encoder results
pub type Result<T> = std::result::Result<T, EncodeError>;
