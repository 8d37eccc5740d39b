//! Line-oriented field framing
//!
//! Messages are newline-delimited `key value` pairs, UTF-8 encoded:
//!
//! ```text
//! sync 5017
//! script smoke/check_mounts.sh
//! status Running
//! ```
//!
//! Fields are untyped strings; callers interpret them. A whole message must
//! fit within a single read of [`MAX_FRAME_SIZE`] bytes.

use std::collections::HashMap;

use bytes::Bytes;

/// Maximum size of one wire frame. Every message must fit within one read.
pub const MAX_FRAME_SIZE: usize = 2048;

/// Encode fields as one `"key value\n"` line each, in the order supplied.
pub fn encode_fields(fields: &[(&str, &str)]) -> Bytes {
    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(key);
        out.push(' ');
        out.push_str(value);
        out.push('\n');
    }
    Bytes::from(out)
}

/// Decode a payload into a field map.
///
/// Returns `None` for payloads that cannot be a field set at all: not UTF-8,
/// or containing no newline or no space. Lines too short to hold a pair are
/// skipped; each remaining line splits into `(key, value)` on its first space.
pub fn decode_fields(payload: &[u8]) -> Option<HashMap<String, String>> {
    let text = std::str::from_utf8(payload).ok()?;
    if !text.contains('\n') || !text.contains(' ') {
        return None;
    }

    let mut fields = HashMap::new();
    for line in text.split('\n') {
        if line.len() <= 2 {
            continue;
        }
        if let Some((key, value)) = line.split_once(' ') {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let fields = [
            ("sync", "5017"),
            ("script", "smoke/a.sh"),
            ("status", "Running"),
        ];
        let encoded = encode_fields(&fields);
        let decoded = decode_fields(&encoded).unwrap();

        assert_eq!(decoded.len(), fields.len());
        for (key, value) in fields {
            assert_eq!(decoded.get(key).map(String::as_str), Some(value));
        }
    }

    #[test]
    fn test_encode_preserves_order() {
        let encoded = encode_fields(&[("ack", "42"), ("extra", "x")]);
        assert_eq!(&encoded[..], b"ack 42\nextra x\n");
    }

    #[test]
    fn test_decode_rejects_payload_without_newline() {
        assert!(decode_fields(b"sync 42").is_none());
    }

    #[test]
    fn test_decode_rejects_payload_without_space() {
        assert!(decode_fields(b"sync\n42\n").is_none());
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        assert!(decode_fields(&[0xff, 0xfe, b' ', b'\n']).is_none());
    }

    #[test]
    fn test_decode_skips_trivial_lines() {
        let decoded = decode_fields(b"sync 42\na \n\n").unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["sync"], "42");
    }

    #[test]
    fn test_decode_splits_on_first_space_only() {
        let decoded = decode_fields(b"script a file with spaces.sh\n").unwrap();
        assert_eq!(decoded["script"], "a file with spaces.sh");
    }
}
