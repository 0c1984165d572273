//! Whitespace-tolerant base64 decoding, used by the LDIF parser for `::`
//! attribute values and by the upload coordinator for ad-hoc inline blobs.

use base64::Engine;

/// Decode base64, stripping any interior whitespace first (LDIF continuation
/// lines can fold a long base64 value across several ` `-prefixed lines).
/// Returns an empty vector on malformed input -- callers treat the attribute
/// as absent rather than aborting the parse (see spec §4.1).
pub fn decode_tolerant(input: &str) -> Vec<u8> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_default()
}

/// Strict variant that surfaces the decode error, for callers (e.g. property
/// tests) that want to distinguish "empty input" from "malformed input".
pub fn decode_strict(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(cleaned.as_bytes())
}

pub fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_input() {
        let encoded = encode(b"hello world");
        assert_eq!(decode_tolerant(&encoded), b"hello world");
    }

    #[test]
    fn tolerates_embedded_whitespace_and_newlines() {
        let encoded = encode(b"the quick brown fox jumps over the lazy dog");
        let mut folded = String::new();
        for (i, ch) in encoded.chars().enumerate() {
            folded.push(ch);
            if i % 8 == 7 {
                folded.push_str("\n ");
            }
        }
        assert_eq!(
            decode_tolerant(&folded),
            b"the quick brown fox jumps over the lazy dog"
        );
    }

    #[test]
    fn malformed_input_decodes_to_empty() {
        assert_eq!(decode_tolerant("not valid base64!!!"), Vec::<u8>::new());
    }

    proptest::proptest! {
        #[test]
        fn encode_decode_round_trip(bytes: Vec<u8>) {
            let encoded = encode(&bytes);
            let decoded = decode_tolerant(&encoded);
            proptest::prop_assert_eq!(decoded, bytes);
        }
    }
}
