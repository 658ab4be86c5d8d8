//! KISS control frames for the serial link to a USB-attached RNode.
//!
//! Commands travel in FEND-delimited frames. The only command this engine
//! sends is Bluetooth control (`CMD_BT_CTRL`), a fixed 4-byte frame:
//! `[FEND, CMD_BT_CTRL, arg, FEND]`.

/// Frame delimiter.
pub const FEND: u8 = 0xC0;
/// Escape byte.
pub const FESC: u8 = 0xDB;
/// Transposed FEND, follows FESC.
pub const TFEND: u8 = 0xDC;
/// Transposed FESC, follows FESC.
pub const TFESC: u8 = 0xDD;

/// Bluetooth control command.
pub const CMD_BT_CTRL: u8 = 0x46;

/// `CMD_BT_CTRL` argument: disable Bluetooth / exit pairing mode.
pub const BT_CTRL_STOP: u8 = 0x00;
/// `CMD_BT_CTRL` argument: enable Bluetooth.
pub const BT_CTRL_START: u8 = 0x01;
/// `CMD_BT_CTRL` argument: enter pairing mode and start advertising.
pub const BT_CTRL_PAIR: u8 = 0x02;

/// Build a Bluetooth control frame.
#[must_use]
pub fn bt_ctrl_frame(arg: u8) -> [u8; 4] {
    [FEND, CMD_BT_CTRL, arg, FEND]
}

/// Escape payload bytes for transmission inside a KISS frame.
///
/// Control-frame arguments here never need escaping, but the helper keeps
/// the framing layer correct for any future payload-carrying command.
#[must_use]
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            FEND => out.extend_from_slice(&[FESC, TFEND]),
            FESC => out.extend_from_slice(&[FESC, TFESC]),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_frame_layout() {
        assert_eq!(bt_ctrl_frame(BT_CTRL_PAIR), [0xC0, 0x46, 0x02, 0xC0]);
        assert_eq!(bt_ctrl_frame(BT_CTRL_STOP), [0xC0, 0x46, 0x00, 0xC0]);
        assert_eq!(bt_ctrl_frame(BT_CTRL_START), [0xC0, 0x46, 0x01, 0xC0]);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(&[0x01, 0x02]), vec![0x01, 0x02]);
        assert_eq!(escape(&[FEND]), vec![FESC, TFEND]);
        assert_eq!(escape(&[FESC]), vec![FESC, TFESC]);
        assert_eq!(
            escape(&[0x01, FEND, FESC, 0x02]),
            vec![0x01, FESC, TFEND, FESC, TFESC, 0x02]
        );
    }
}
