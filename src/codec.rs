//! ASCII-hex frame codec.
//!
//! Every frame on the wire is `~`, upper-case hex text, then a carriage return.
//! Inbound frames are decoded leniently: anything that does not look like hex
//! text yields an empty payload instead of an error.

/// Start-of-frame delimiter.
pub const DELIMITER: u8 = b'~';
/// End-of-frame terminator.
pub const TERMINATOR: u8 = b'\r';

/// Strip framing from a raw response and decode the hex text in between.
///
/// Surrounding whitespace is trimmed first, then at most one leading `~` and
/// one trailing `\r` are removed. Missing framing is tolerated. Odd-length text
/// or non-hex characters give an empty payload.
pub fn decode(raw: &[u8]) -> Vec<u8> {
    let text = strip_frame(raw);
    if text.is_empty() {
        return Vec::new();
    }
    match hex::decode(text) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Cannot decode frame {:02X?}: {}", raw, e);
            Vec::new()
        }
    }
}

/// Return the hex text of a frame without delimiter and terminator.
pub(crate) fn strip_frame(raw: &[u8]) -> &[u8] {
    let mut text = raw.trim_ascii();
    if let [DELIMITER, rest @ ..] = text {
        text = rest;
    }
    if let [rest @ .., TERMINATOR] = text {
        text = rest;
    }
    text.trim_ascii()
}

/// Wrap hex command text into a wire frame.
pub fn encode(hex_text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(hex_text.len() + 2);
    frame.push(DELIMITER);
    frame.extend(hex_text.bytes().map(|b| b.to_ascii_uppercase()));
    frame.push(TERMINATOR);
    frame
}

/// Sum every ASCII character and return the two's complement modulo 65536.
pub fn frame_checksum(text: &[u8]) -> u16 {
    let sum = text
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
    (!sum).wrapping_add(1)
}

/// Encode the 12-bit length of the INFO text together with its nibble checksum.
pub fn length_field(info_len: usize) -> u16 {
    let len = (info_len & 0x0fff) as u16;
    let nibbles = (len & 0xf) + ((len >> 4) & 0xf) + ((len >> 8) & 0xf);
    let check = (!nibbles).wrapping_add(1) & 0xf;
    (check << 12) | len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_framed_response() {
        assert_eq!(decode(b"~0A1b\r"), vec![0x0a, 0x1b]);
    }

    #[test]
    fn test_decode_surrounding_whitespace() {
        assert_eq!(decode(b"  ~1770\r\n"), vec![0x17, 0x70]);
    }

    #[test]
    fn test_decode_missing_framing() {
        assert_eq!(decode(b"1770"), vec![0x17, 0x70]);
        assert_eq!(decode(b"~1770"), vec![0x17, 0x70]);
        assert_eq!(decode(b"1770\r"), vec![0x17, 0x70]);
    }

    #[test]
    fn test_decode_failures_are_empty() {
        assert!(decode(b"").is_empty());
        assert!(decode(b"~\r").is_empty());
        assert!(decode(b"~177\r").is_empty());
        assert!(decode(b"~17G0\r").is_empty());
        assert!(decode(&[0x7e, 0xff, 0xfe, 0x0d]).is_empty());
    }

    #[test]
    fn test_encode_then_decode_yields_command_bytes() {
        let frame = encode("610146b7e00201fd1d");
        assert_eq!(frame, b"~610146B7E00201FD1D\r");
        assert_eq!(
            decode(&frame),
            vec![0x61, 0x01, 0x46, 0xb7, 0xe0, 0x02, 0x01, 0xfd, 0x1d]
        );
    }

    #[test]
    fn test_frame_checksum() {
        assert_eq!(frame_checksum(b"610146B7E00201"), 0xfd1d);
    }

    #[test]
    fn test_length_field() {
        assert_eq!(length_field(2), 0xe002);
        assert_eq!(length_field(0), 0x0000);
        // 0x012: nibbles 1 + 2 = 3, check = 0xd
        assert_eq!(length_field(0x12), 0xd012);
    }
}
