//! ICAO Deviation List parsing (spec §3 glossary, SPEC_FULL.md §B.2).
//!
//! A Deviation List is a CMS `SignedData` envelope identical in shape to a
//! Master List's (RFC 5652 outer envelope, ICAO-specific inner content) but
//! whose encapsulated content is
//! `SEQUENCE { version INTEGER OPTIONAL, deviations SET OF DeviationDescription }`
//! where each `DeviationDescription` is
//! `SEQUENCE { certificateIssuer Name, certificateSerialNumber INTEGER,
//!             deviationDescription SEQUENCE { category OID, description UTF8String } }`.
//! This module reuses the same CMS envelope handling as [`crate::cms::extractor`]
//! and the same hand-rolled inner-content reader in [`crate::cms::der`].

use cryptographic_message_syntax::SignedData;

use crate::asn1::fingerprint::sha256_hex;
use crate::cms::der::{read_tlv, TAG_INTEGER, TAG_SEQUENCE, TAG_SET};
use crate::config::CmsVerifyPolicy;
use crate::error::{PkdError, Result};

pub struct ParsedDeviationList {
    pub signer_country: String,
    pub signer_dn: String,
    pub fingerprint_sha256: String,
    pub cms_signature_verified: bool,
    pub defects: Vec<ParsedDefect>,
}

impl ParsedDeviationList {
    /// Fill in `signerCountry`/`signerDn` from the DN of the LDIF entry (or
    /// equivalent source-of-truth) that carried this Deviation List, since
    /// the CMS envelope's own signer certificate isn't a reliable source
    /// for it.
    pub fn with_signer_dn(mut self, dn: &str) -> Self {
        self.signer_country = crate::asn1::dn::extract_country_code(dn);
        self.signer_dn = dn.to_string();
        self
    }
}

pub struct ParsedDefect {
    pub certificate_issuer_dn: String,
    pub certificate_serial_number: String,
    pub defect_type_oid: String,
    pub defect_category: String,
    pub defect_description: String,
}

/// Parse and verify a Deviation List's CMS envelope and walk its
/// ICAO-specific inner content. Under [`CmsVerifyPolicy::Strict`], an
/// unverified CMS signature aborts parsing; under `Permissive` it is
/// recorded on the result and parsing proceeds, mirroring
/// [`crate::cms::extractor::extract_master_list`].
pub fn parse_deviation_list(cms_der: &[u8], policy: CmsVerifyPolicy) -> Result<ParsedDeviationList> {
    let outer = read_tlv(cms_der)?;
    if outer.tag != TAG_SEQUENCE {
        return Err(PkdError::InvalidCms(
            "Deviation List CMS content does not start with a SEQUENCE tag".to_string(),
        ));
    }

    let signed_data = SignedData::parse_ber(cms_der)
        .map_err(|e| PkdError::InvalidCms(format!("Deviation List CMS decode failed: {e:?}")))?;

    let econtent = signed_data
        .signed_content()
        .ok_or_else(|| PkdError::InvalidCms("Deviation List CMS has no encapsulated content".to_string()))?;

    let mut cms_signature_verified = false;
    for signer in signed_data.signers() {
        if signer.verify_signature_with_signed_data(&signed_data).is_ok() {
            cms_signature_verified = true;
            break;
        }
    }

    if !cms_signature_verified && policy == CmsVerifyPolicy::Strict {
        return Err(PkdError::InvalidCms(
            "no CMS signer verified against the embedded certificate chain".to_string(),
        ));
    }

    // The signer's own certificate DN isn't needed to interpret the
    // deviation entries themselves; callers that need `signerCountry`/
    // `signerDn` populated from the certificate rather than left blank
    // supply the enclosing upload's LDIF entry DN via `signer_dn_hint`.
    let defects = parse_deviation_body(econtent)?;

    Ok(ParsedDeviationList {
        signer_country: String::new(),
        signer_dn: String::new(),
        fingerprint_sha256: sha256_hex(cms_der),
        cms_signature_verified,
        defects,
    })
}

fn parse_deviation_body(econtent: &[u8]) -> Result<Vec<ParsedDefect>> {
    let outer = read_tlv(econtent)?;
    if outer.tag != TAG_SEQUENCE {
        return Err(PkdError::InvalidCms("Deviation List content is not a SEQUENCE".to_string()));
    }

    let body = outer.content;
    let first = read_tlv(body)?;
    let set_content = if first.tag == TAG_INTEGER {
        let set_tlv = read_tlv(&body[first.total_len()..])?;
        if set_tlv.tag != TAG_SET {
            return Err(PkdError::InvalidCms("Deviation List deviations field is not a SET".to_string()));
        }
        set_tlv.content
    } else if first.tag == TAG_SET {
        first.content
    } else {
        return Err(PkdError::InvalidCms(format!(
            "unexpected tag 0x{:02x} at the start of Deviation List content",
            first.tag
        )));
    };

    let mut defects = Vec::new();
    let mut offset = 0usize;
    while offset < set_content.len() {
        let tlv = read_tlv(&set_content[offset..])?;
        if tlv.tag != TAG_SEQUENCE {
            return Err(PkdError::InvalidCms(format!(
                "expected a DeviationDescription SEQUENCE, found tag 0x{:02x}",
                tlv.tag
            )));
        }
        defects.push(parse_deviation_description(tlv.content)?);
        offset += tlv.total_len();
    }
    Ok(defects)
}

/// `SEQUENCE { certificateIssuer Name, certificateSerialNumber INTEGER,
///             deviationDescription SEQUENCE { category OID, description UTF8String } }`
fn parse_deviation_description(content: &[u8]) -> Result<ParsedDefect> {
    let issuer_tlv = read_tlv(content)?;
    let issuer_dn = format!("RAW:{}", hex::encode(issuer_tlv.content));
    let mut offset = issuer_tlv.total_len();

    let serial_tlv = read_tlv(&content[offset..])?;
    let certificate_serial_number = hex::encode(serial_tlv.content).to_uppercase();
    offset += serial_tlv.total_len();

    let description_tlv = read_tlv(&content[offset..])?;
    let description_content = description_tlv.content;

    let oid_tlv = read_tlv(description_content)?;
    let defect_type_oid = decode_oid(oid_tlv.content);
    let mut desc_offset = oid_tlv.total_len();

    let (defect_category, defect_description) = if desc_offset < description_content.len() {
        let text_tlv = read_tlv(&description_content[desc_offset..])?;
        desc_offset += text_tlv.total_len();
        (
            category_from_oid(&defect_type_oid),
            String::from_utf8_lossy(text_tlv.content).into_owned(),
        )
    } else {
        (category_from_oid(&defect_type_oid), String::new())
    };
    let _ = desc_offset;

    Ok(ParsedDefect {
        certificate_issuer_dn: issuer_dn,
        certificate_serial_number,
        defect_type_oid,
        defect_category,
        defect_description,
    })
}

fn decode_oid(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    parts.push((bytes[0] / 40) as u64);
    parts.push((bytes[0] % 40) as u64);

    let mut value: u64 = 0;
    for &b in &bytes[1..] {
        value = (value << 7) | (b & 0x7f) as u64;
        if b & 0x80 == 0 {
            parts.push(value);
            value = 0;
        }
    }
    parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(".")
}

/// ICAO Doc 9303 Part 12 defines a small fixed set of deviation categories,
/// each under the `id-icao-mrtd-security-deviationList` arc. Unknown OIDs
/// are reported verbatim rather than guessed at.
fn category_from_oid(oid: &str) -> String {
    match oid {
        "2.23.136.1.1.6.1" => "CscaMasterListSigningKeyUsage".to_string(),
        "2.23.136.1.1.6.2" => "DscSigningKeyUsage".to_string(),
        "2.23.136.1.1.6.3" => "DscEfDgHashAlgorithm".to_string(),
        other => format!("Unknown({other})"),
    }
}
