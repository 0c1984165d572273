//! CRL parsing (SPEC_FULL.md §B.1): decode a DER/PEM Certificate Revocation
//! List, extract issuer DN, `thisUpdate`/`nextUpdate`, `crlNumber`, and the
//! revoked-serial list with ICAO revocation reasons.
//!
//! Reuses C1's DN/time helpers and sits as a first-class peer of the CMS
//! extractor (C7): a CRL is never embedded in a Master List, but the same
//! upload pipeline dispatches to it whenever an LDIF entry carries
//! `certificateRevocationList;binary` or an upload's file format is `CRL`.

use x509_parser::revocation_list::CertificateRevocationList;
use x509_parser::extensions::ReasonCode;

use crate::asn1::{
    dn::{extract_country_code, render_dn_rfc2253},
    fingerprint::sha256_hex,
    time::{asn1_time_to_chrono, serial_to_hex},
};
use crate::error::{PkdError, Result};
use crate::model::RevocationReason;

pub struct ParsedCrl {
    pub country_code: String,
    pub issuer_dn: String,
    pub this_update: chrono::DateTime<chrono::Utc>,
    pub next_update: Option<chrono::DateTime<chrono::Utc>>,
    pub crl_number: Option<String>,
    pub fingerprint_sha256: String,
    pub revoked: Vec<ParsedRevokedCertificate>,
}

pub struct ParsedRevokedCertificate {
    pub serial_number: String,
    pub revocation_date: chrono::DateTime<chrono::Utc>,
    pub revocation_reason: RevocationReason,
}

/// Parse a DER-encoded CRL. Callers that hold a PEM file should strip the
/// armor first (`pem::parse`) -- this function only ever sees DER bytes.
pub fn parse(der: &[u8]) -> Result<ParsedCrl> {
    let (_, crl) = CertificateRevocationList::from_der(der)
        .map_err(|e| PkdError::X509Parse(format!("CRL decode failed: {e}")))?;

    let issuer_dn = render_dn_rfc2253(crl.issuer());
    let country_code = extract_country_code(&issuer_dn);

    let this_update = asn1_time_to_chrono(crl.last_update());
    let next_update = crl.next_update().map(asn1_time_to_chrono);
    let crl_number = crl
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            x509_parser::extensions::ParsedExtension::CRLNumber(n) => {
                Some(n.to_string())
            }
            _ => None,
        });

    let revoked = crl
        .iter_revoked_certificates()
        .map(|entry| {
            let reason = entry
                .extensions()
                .iter()
                .find_map(|ext| match ext.parsed_extension() {
                    x509_parser::extensions::ParsedExtension::ReasonCode(code) => {
                        Some(reason_from_code(*code))
                    }
                    _ => None,
                })
                .unwrap_or(RevocationReason::Unspecified);
            ParsedRevokedCertificate {
                serial_number: serial_to_hex(&entry.user_certificate),
                revocation_date: asn1_time_to_chrono(&entry.revocation_date),
                revocation_reason: reason,
            }
        })
        .collect();

    Ok(ParsedCrl {
        country_code,
        issuer_dn,
        this_update,
        next_update,
        crl_number,
        fingerprint_sha256: sha256_hex(der),
        revoked,
    })
}

fn reason_from_code(code: ReasonCode) -> RevocationReason {
    match code.0 {
        0 => RevocationReason::Unspecified,
        1 => RevocationReason::KeyCompromise,
        2 => RevocationReason::CaCompromise,
        3 => RevocationReason::AffiliationChanged,
        4 => RevocationReason::Superseded,
        5 => RevocationReason::CessationOfOperation,
        6 => RevocationReason::CertificateHold,
        8 => RevocationReason::RemoveFromCrl,
        9 => RevocationReason::PrivilegeWithdrawn,
        10 => RevocationReason::AaCompromise,
        _ => RevocationReason::Unspecified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reason_code_maps_to_unspecified() {
        assert_eq!(reason_from_code(ReasonCode(99)), RevocationReason::Unspecified);
    }

    #[test]
    fn known_reason_codes_round_trip() {
        assert_eq!(reason_from_code(ReasonCode(1)), RevocationReason::KeyCompromise);
        assert_eq!(reason_from_code(ReasonCode(6)), RevocationReason::CertificateHold);
    }
}
