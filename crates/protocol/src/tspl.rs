//! TSPL label encoding
//!
//! TSPL is the line-oriented command language spoken by most desktop barcode
//! label printers. A label job is a geometry preamble, a list of drawing
//! directives and a final `PRINT`. Every line ends with CR LF.
//!
//! ```text
//! SIZE 800,1200
//! GAP 0,0
//! DENSITY 7
//! SPEED 4
//! DIRECTION 1
//! CLS
//! BARCODE 60,40,"128",75,1,0,2,2,"8991234567890"
//! TEXT 160,160,"2",0,1,1,"Kopi Susu"
//! ...
//! PRINT 1,1
//! ```
//!
//! The same barcode and product name are repeated into every slot of the
//! layout, so one job prints a full sheet of identical stickers.

use crate::error::{EncodeError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Line terminator required by TSPL firmware
const CRLF: &[u8] = b"\r\n";

/// TSPL escape sequence for a literal double quote inside a string operand
const QUOTE_ESCAPE: &str = "\\[\"]";

/// Top-left corner of one barcode + caption block, in printer dots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub x: u32,
    pub y: u32,
}

impl Slot {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Label geometry and slot placement
///
/// The defaults reproduce the 800x1200 sheet with two columns and four rows
/// of Code 128 stickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelLayout {
    /// `SIZE` width operand
    pub width: u32,
    /// `SIZE` height operand
    pub height: u32,
    /// `GAP` distance between labels
    pub gap: u32,
    /// `GAP` offset
    pub gap_offset: u32,
    /// Print darkness (0-15)
    pub density: u8,
    /// Print speed in inches per second
    pub speed: u8,
    /// Feed direction (0 or 1)
    pub direction: u8,
    /// Maximum number of product name characters printed under each barcode
    pub name_max_chars: usize,
    /// Nominal rendered barcode width, used to center the caption
    pub barcode_width: u32,
    /// Barcode bar height in dots
    pub barcode_height: u32,
    /// Caption shift left from the barcode's horizontal center
    pub text_x_shift: u32,
    /// Caption distance below the barcode origin
    pub text_y_offset: u32,
    /// Slot origins, printed in order
    pub slots: Vec<Slot>,
}

impl Default for LabelLayout {
    fn default() -> Self {
        Self::sheet()
    }
}

impl LabelLayout {
    /// Two columns by four rows on an 800x1200 sheet
    pub fn sheet() -> Self {
        let mut slots = Vec::with_capacity(8);
        for y in [40, 320, 600, 880] {
            for x in [60, 430] {
                slots.push(Slot::new(x, y));
            }
        }

        Self {
            width: 800,
            height: 1200,
            gap: 0,
            gap_offset: 0,
            density: 7,
            speed: 4,
            direction: 1,
            name_max_chars: 16,
            barcode_width: 240,
            barcode_height: 75,
            text_x_shift: 20,
            text_y_offset: 120,
            slots,
        }
    }

    /// Same geometry with a single sticker in the top-left corner
    pub fn single() -> Self {
        Self {
            slots: vec![Slot::new(60, 40)],
            ..Self::sheet()
        }
    }

    /// Caption origin for a slot
    fn caption_origin(&self, slot: Slot) -> Result<(u32, u32)> {
        let overflow = EncodeError::CoordinateOverflow {
            x: slot.x,
            y: slot.y,
        };
        let x = slot
            .x
            .checked_add(self.barcode_width / 2)
            .ok_or_else(|| overflow.clone())?
            .saturating_sub(self.text_x_shift);
        let y = slot.y.checked_add(self.text_y_offset).ok_or(overflow)?;
        Ok((x, y))
    }
}

/// Encode a barcode label job
///
/// The barcode must be non-empty printable ASCII without double quotes. The
/// product name is truncated to [`LabelLayout::name_max_chars`] characters and
/// then sanitized for the ASCII command stream.
pub fn encode_label(layout: &LabelLayout, name: &str, barcode: &str) -> Result<Bytes> {
    validate_barcode(barcode)?;
    if layout.slots.is_empty() {
        return Err(EncodeError::NoSlots);
    }

    let caption = sanitize_caption(&truncate_name(name, layout.name_max_chars));

    let mut buf = BytesMut::with_capacity(128 + layout.slots.len() * 96);
    put_line(&mut buf, &format!("SIZE {},{}", layout.width, layout.height));
    put_line(&mut buf, &format!("GAP {},{}", layout.gap, layout.gap_offset));
    put_line(&mut buf, &format!("DENSITY {}", layout.density));
    put_line(&mut buf, &format!("SPEED {}", layout.speed));
    put_line(&mut buf, &format!("DIRECTION {}", layout.direction));
    put_line(&mut buf, "CLS");

    for slot in &layout.slots {
        let (text_x, text_y) = layout.caption_origin(*slot)?;
        put_line(
            &mut buf,
            &format!(
                "BARCODE {},{},\"128\",{},1,0,2,2,\"{}\"",
                slot.x, slot.y, layout.barcode_height, barcode
            ),
        );
        put_line(
            &mut buf,
            &format!("TEXT {},{},\"2\",0,1,1,\"{}\"", text_x, text_y, caption),
        );
    }

    put_line(&mut buf, "PRINT 1,1");
    Ok(buf.freeze())
}

/// Keep at most `max_chars` characters of a product name
pub fn truncate_name(name: &str, max_chars: usize) -> String {
    name.chars().take(max_chars).collect()
}

fn validate_barcode(barcode: &str) -> Result<()> {
    if barcode.is_empty() {
        return Err(EncodeError::EmptyBarcode);
    }

    for (position, character) in barcode.chars().enumerate() {
        let printable = character == ' ' || character.is_ascii_graphic();
        if !printable || character == '"' {
            return Err(EncodeError::InvalidBarcodeCharacter {
                character,
                position,
            });
        }
    }

    Ok(())
}

/// Map a caption onto the ASCII command stream
///
/// Non-ASCII characters become `?`, control characters become spaces so they
/// cannot terminate the directive, and quotes use the TSPL escape.
fn sanitize_caption(caption: &str) -> String {
    let mut out = String::with_capacity(caption.len());
    for c in caption.chars() {
        match c {
            '"' => out.push_str(QUOTE_ESCAPE),
            c if c.is_ascii_control() => out.push(' '),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF);
}
