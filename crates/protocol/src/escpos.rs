//! ESC/POS receipt and cash drawer encoding

use crate::error::{EncodeError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// ESC - command prefix
pub const ESC: u8 = 0x1B;

/// GS - extended command prefix
pub const GS: u8 = 0x1D;

/// LF - print buffer and feed one line
pub const LF: u8 = 0x0A;

/// `ESC @` - reset the printer to power-on defaults
pub const INITIALIZE: [u8; 2] = [ESC, b'@'];

/// `GS V 66 0` - feed to the cutter and partial cut
pub const FEED_AND_CUT: [u8; 4] = [GS, b'V', 66, 0];

/// Receipt framing options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptOptions {
    /// Blank lines appended after the text so it clears the tear bar
    pub feed_lines: u8,
    /// Prefix the job with `ESC @`
    pub initialize: bool,
    /// Finish the job with a feed-and-cut
    pub cut: bool,
}

impl Default for ReceiptOptions {
    fn default() -> Self {
        Self {
            feed_lines: 3,
            initialize: false,
            cut: false,
        }
    }
}

/// Encode a plain text receipt
///
/// The text is sent as UTF-8 exactly as given; the printer's code page decides
/// how anything beyond ASCII renders.
pub fn encode_receipt(text: &str, options: &ReceiptOptions) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + options.feed_lines as usize + 8);

    if options.initialize {
        buf.put_slice(&INITIALIZE);
    }
    buf.put_slice(text.as_bytes());
    buf.put_bytes(LF, options.feed_lines as usize);
    if options.cut {
        buf.put_slice(&FEED_AND_CUT);
    }

    buf.freeze()
}

/// Cash drawer pulse parameters for `ESC p m t1 t2`
///
/// `on_time` and `off_time` are in units of 2 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawerPulse {
    /// Connector pin: 0 = pin 2, 1 = pin 5
    pub pin: u8,
    pub on_time: u8,
    pub off_time: u8,
}

impl Default for DrawerPulse {
    fn default() -> Self {
        Self {
            pin: 0,
            on_time: 25,
            off_time: 250,
        }
    }
}

/// Encode the 5-byte drawer kick command
pub fn encode_drawer_kick(pulse: &DrawerPulse) -> Result<Bytes> {
    if pulse.pin > 1 {
        return Err(EncodeError::InvalidDrawerPin(pulse.pin));
    }

    Ok(Bytes::copy_from_slice(&[
        ESC,
        b'p',
        pulse.pin,
        pulse.on_time,
        pulse.off_time,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_golden() {
        let bytes = encode_receipt("TOKO MAJU\nTotal 15.000", &ReceiptOptions::default());
        assert_eq!(bytes.as_ref(), b"TOKO MAJU\nTotal 15.000\n\n\n");
    }

    #[test]
    fn test_receipt_utf8_passthrough() {
        let bytes = encode_receipt("Crème brûlée", &ReceiptOptions::default());
        assert_eq!(&bytes[..bytes.len() - 3], "Crème brûlée".as_bytes());
    }

    #[test]
    fn test_empty_receipt_is_feed_only() {
        let bytes = encode_receipt("", &ReceiptOptions::default());
        assert_eq!(bytes.as_ref(), b"\n\n\n");
    }

    #[test]
    fn test_receipt_with_init_and_cut() {
        let options = ReceiptOptions {
            feed_lines: 1,
            initialize: true,
            cut: true,
        };
        let bytes = encode_receipt("hi", &options);
        assert_eq!(bytes.as_ref(), &[0x1B, b'@', b'h', b'i', 0x0A, 0x1D, b'V', 66, 0]);
    }

    #[test]
    fn test_drawer_kick_golden() {
        let bytes = encode_drawer_kick(&DrawerPulse::default()).unwrap();
        assert_eq!(bytes.as_ref(), &[0x1B, 0x70, 0x00, 0x19, 0xFA]);
    }

    #[test]
    fn test_drawer_kick_pin_five() {
        let pulse = DrawerPulse {
            pin: 1,
            ..DrawerPulse::default()
        };
        let bytes = encode_drawer_kick(&pulse).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[2], 1);
    }

    #[test]
    fn test_drawer_kick_invalid_pin() {
        let pulse = DrawerPulse {
            pin: 2,
            ..DrawerPulse::default()
        };
        assert_eq!(
            encode_drawer_kick(&pulse),
            Err(EncodeError::InvalidDrawerPin(2))
        );
    }
}
