//! SLIP framing (RFC 1055) for the serial link.
//!
//! Every envelope travels as one SLIP frame:
//!
//! ```text
//! +------+--------------------------------+------+
//! | 0xC0 | payload, END/ESC bytes escaped | 0xC0 |
//! +------+--------------------------------+------+
//! ```
//!
//! `0xC0` in the payload becomes `0xDB 0xDC`, `0xDB` becomes `0xDB 0xDD`.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped literal END.
pub const ESC_END: u8 = 0xDC;
/// Escaped literal ESC.
pub const ESC_ESC: u8 = 0xDD;

/// Encodes a payload as one SLIP frame, delimiters included.
pub fn encode(data: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(data.len() + 2);
    out.put_u8(END);
    for &byte in data {
        match byte {
            END => out.put_slice(&[ESC, ESC_END]),
            ESC => out.put_slice(&[ESC, ESC_ESC]),
            _ => out.put_u8(byte),
        }
    }
    out.put_u8(END);
    out
}

/// Decodes SLIP-framed data (with or without END delimiters) back to raw
/// bytes.
///
/// Fails when an escape introducer is the last byte, or is followed by
/// anything other than the two escaped-literal codes.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            ESC => match iter.next() {
                Some(&ESC_END) => out.push(END),
                Some(&ESC_ESC) => out.push(ESC),
                Some(&other) => return Err(ProtocolError::InvalidEscape(other)),
                None => return Err(ProtocolError::TrailingEscape),
            },
            END => {}
            _ => out.push(byte),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_escapes_special_bytes() {
        let encoded = encode(&[0xC0, 0xDB]);
        assert_eq!(encoded.as_ref(), &[0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0xC0]);
    }

    #[test]
    fn test_decode_resolves_escapes() {
        let decoded = decode(&[0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0xC0]).unwrap();
        assert_eq!(decoded, vec![0xC0, 0xDB]);
    }

    #[test]
    fn test_plain_bytes_pass_through() {
        let encoded = encode(b"hello");
        assert_eq!(encoded.as_ref(), b"\xC0hello\xC0");
        assert_eq!(decode(&encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode(&[]);
        assert_eq!(encoded.as_ref(), &[0xC0, 0xC0]);
        assert!(decode(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_decode_without_delimiters() {
        let decoded = decode(&[0x01, 0xDB, 0xDC, 0x02]).unwrap();
        assert_eq!(decoded, vec![0x01, 0xC0, 0x02]);
    }

    #[test]
    fn test_trailing_escape_fails() {
        let result = decode(&[0x01, 0xDB]);
        assert!(matches!(result, Err(ProtocolError::TrailingEscape)));
    }

    #[test]
    fn test_invalid_escape_fails() {
        let result = decode(&[0xDB, 0x42]);
        assert!(matches!(result, Err(ProtocolError::InvalidEscape(0x42))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode(&data);
            let decoded = decode(&encoded).unwrap();
            prop_assert_eq!(decoded, data);
        }

        #[test]
        fn prop_encoded_interior_has_no_bare_end(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode(&data);
            let interior = &encoded[1..encoded.len() - 1];
            prop_assert!(!interior.contains(&END));
        }
    }
}
