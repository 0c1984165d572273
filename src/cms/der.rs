//! Minimal BER/DER tag-length-value reader.
//!
//! The CMS envelope itself is decoded by `cryptographic-message-syntax`
//! (RFC 5652 is its job); this reader exists for the ICAO-specific content
//! nested *inside* a Master List's `encapContentInfo` --
//! `SEQUENCE { version INTEGER OPTIONAL, certList SET OF Certificate }` --
//! which is outside RFC 5652's own grammar and so unknown to that crate.

use crate::error::{PkdError, Result};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// One decoded tag-length-value triple. `content` is the value bytes only;
/// `header_len` is how many bytes the tag+length occupied, so callers that
/// need the *whole* TLV (e.g. to re-feed a nested `Certificate` to
/// `x509_parser`) can slice `header_len + content.len()` bytes from the
/// original buffer.
pub struct Tlv<'a> {
    pub tag: u8,
    pub header_len: usize,
    pub content: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn total_len(&self) -> usize {
        self.header_len + self.content.len()
    }
}

/// Parse a single definite-length TLV at the start of `data`. Indefinite
/// BER lengths (`0x80`) are not supported -- ICAO Master Lists and the CMS
/// SignedData wrapping them are DER in practice.
pub fn read_tlv(data: &[u8]) -> Result<Tlv<'_>> {
    if data.is_empty() {
        return Err(PkdError::InvalidCms("empty TLV buffer".to_string()));
    }
    let tag = data[0];
    if data.len() < 2 {
        return Err(PkdError::InvalidCms("truncated TLV header".to_string()));
    }

    let first_len_byte = data[1];
    let (length, length_bytes) = if first_len_byte & 0x80 == 0 {
        (first_len_byte as usize, 1usize)
    } else {
        let num_bytes = (first_len_byte & 0x7f) as usize;
        if num_bytes == 0 {
            return Err(PkdError::InvalidCms(
                "indefinite-length BER encoding is not supported".to_string(),
            ));
        }
        if data.len() < 2 + num_bytes {
            return Err(PkdError::InvalidCms("truncated long-form length".to_string()));
        }
        let mut length = 0usize;
        for &b in &data[2..2 + num_bytes] {
            length = (length << 8) | b as usize;
        }
        (length, 1 + num_bytes)
    };

    let header_len = 1 + length_bytes;
    if data.len() < header_len + length {
        return Err(PkdError::InvalidCms("TLV content shorter than declared length".to_string()));
    }

    Ok(Tlv {
        tag,
        header_len,
        content: &data[header_len..header_len + length],
    })
}

/// Iterate the top-level TLVs inside a constructed value's content bytes
/// (e.g. the members of a `SET OF Certificate`).
pub fn iter_children(content: &[u8]) -> Result<Vec<Tlv<'_>>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < content.len() {
        let tlv = read_tlv(&content[offset..])?;
        let consumed = tlv.total_len();
        out.push(tlv);
        offset += consumed;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_short_form_length() {
        let data = [0x30, 0x03, 0x01, 0x02, 0x03];
        let tlv = read_tlv(&data).unwrap();
        assert_eq!(tlv.tag, TAG_SEQUENCE);
        assert_eq!(tlv.content, &[0x01, 0x02, 0x03]);
        assert_eq!(tlv.total_len(), 5);
    }

    #[test]
    fn reads_long_form_length() {
        let mut data = vec![0x30, 0x82, 0x01, 0x00];
        data.extend(std::iter::repeat(0xAA).take(256));
        let tlv = read_tlv(&data).unwrap();
        assert_eq!(tlv.content.len(), 256);
    }

    #[test]
    fn iterates_multiple_top_level_children() {
        let data = [0x02, 0x01, 0x01, 0x30, 0x02, 0xAA, 0xBB];
        let children = iter_children(&data).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].tag, TAG_INTEGER);
        assert_eq!(children[1].tag, TAG_SEQUENCE);
    }

    #[test]
    fn rejects_truncated_content() {
        let data = [0x30, 0x05, 0x01];
        assert!(read_tlv(&data).is_err());
    }
}
