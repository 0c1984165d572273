//! Trust-chain engine (spec §4.8, C8): CSCA self-signature validation and
//! DSC→CSCA chain building with key-rollover link traversal under the
//! ICAO Doc 9303 Part 12 hybrid validity model.
//!
//! Per the design notes (spec §9), chains are built over an owned arena of
//! candidate certificates (`ChainCandidate`) rather than a pointer graph --
//! callers (the processing strategies) pre-fetch the relevant CSCA rows for
//! an upload/country once and hand a flat slice in here, keeping this
//! module itself synchronous and DB-free.

use std::collections::HashSet;

use chrono::Utc;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::asn1::dn::render_dn_rfc2253;
use crate::classify::is_self_signed;
use crate::error::{PkdError, Result};
use crate::model::ValidationStatus;
use crate::trustchain::sigalg::verify_signed_by;

/// Maximum chain depth (spec §4.8 step 5).
pub const MAX_DEPTH: usize = 5;

/// One candidate issuer in the arena: a CSCA (root or link) the chain
/// builder may step to. Kept as owned DER so the whole arena can be
/// collected once per upload/country from the repository layer.
#[derive(Debug, Clone)]
pub struct ChainCandidate {
    pub subject_dn: String,
    pub der: Vec<u8>,
}

/// Result of validating a CSCA's own self-signature (spec §4.8 "CSCA
/// self-validation"). Each condition is reported separately so a caller
/// can distinguish WARNING (signature fine, flags missing) from INVALID.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSignedCheck {
    pub subject_equals_issuer: bool,
    pub signature_verified: bool,
    pub is_ca: bool,
    pub key_cert_sign: bool,
}

impl SelfSignedCheck {
    pub fn is_fully_valid(&self) -> bool {
        self.subject_equals_issuer && self.signature_verified && self.is_ca && self.key_cert_sign
    }

    /// Signature checks out but CA/KeyUsage flags are missing or wrong --
    /// the WARNING case the spec calls out explicitly.
    pub fn is_warning(&self) -> bool {
        self.subject_equals_issuer && self.signature_verified && !(self.is_ca && self.key_cert_sign)
    }
}

pub fn validate_csca_self_signed(cert: &X509Certificate) -> SelfSignedCheck {
    let subject_equals_issuer = is_self_signed(cert);
    let signature_verified = subject_equals_issuer && verify_signed_by(cert, cert).unwrap_or(false);
    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false);
    let key_cert_sign = cert
        .key_usage()
        .ok()
        .flatten()
        .map(|ku| ku.value.flags & (1 << 5) != 0)
        .unwrap_or(false);

    SelfSignedCheck {
        subject_equals_issuer,
        signature_verified,
        is_ca,
        key_cert_sign,
    }
}

/// Output of chain building + validation (spec §4.8 "Output").
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub is_valid: bool,
    pub csca_found: bool,
    pub signature_valid: bool,
    pub not_expired: bool,
    pub dsc_expired: bool,
    pub csca_expired: bool,
    pub csca_subject_dn: Option<String>,
    pub trust_chain_path: String,
    pub error_message: Option<String>,
    pub error_code: Option<&'static str>,
}

/// Build and validate the trust chain for `target_der` (a DSC, a link
/// certificate, or a non-self-signed CSCA) against `universe`, the flat
/// arena of candidate CSCAs the caller pre-fetched.
///
/// `leaf_label` is the human-readable name for the target in the rendered
/// chain path (`"DSC"` for the common case; the link-certificate
/// validation endpoint passes `"LinkCert"`).
pub fn build_and_validate_chain(
    target_der: &[u8],
    universe: &[ChainCandidate],
    leaf_label: &str,
) -> Result<ChainOutcome> {
    let (_, target) = X509Certificate::from_der(target_der)
        .map_err(|e| PkdError::X509Parse(format!("target certificate decode failed: {e}")))?;

    let now = Utc::now();
    let leaf_not_before = crate::asn1::time::asn1_time_to_chrono(&target.validity().not_before);
    let leaf_not_after = crate::asn1::time::asn1_time_to_chrono(&target.validity().not_after);
    let not_yet_valid = leaf_not_before > now;
    let dsc_expired = leaf_not_after < now;

    if not_yet_valid {
        return Ok(ChainOutcome {
            is_valid: false,
            csca_found: false,
            signature_valid: false,
            not_expired: !dsc_expired,
            dsc_expired,
            csca_expired: false,
            csca_subject_dn: None,
            trust_chain_path: leaf_label.to_string(),
            error_message: Some("certificate is not yet valid (notBefore is in the future)".to_string()),
            error_code: Some("NOT_YET_VALID"),
        });
    }

    let mut path = vec![leaf_label.to_string()];
    let mut visited: HashSet<String> = HashSet::new();
    let mut current_der: Vec<u8> = target_der.to_vec();
    let mut signature_valid = true;
    let mut csca_found = false;
    let mut csca_expired = false;
    let mut csca_subject_dn = None;
    let mut error_message = None;
    let mut error_code = None;
    let mut depth = 0usize;

    loop {
        let (_, current) = X509Certificate::from_der(&current_der)
            .map_err(|e| PkdError::X509Parse(format!("chain certificate decode failed: {e}")))?;

        if is_self_signed(&current) {
            let self_check = validate_csca_self_signed(&current);
            signature_valid = signature_valid && self_check.signature_verified;
            csca_found = true;
            let subject = render_dn_rfc2253(current.subject());
            path.push(common_name_or_full(&subject));
            csca_subject_dn = Some(subject);
            let not_after = crate::asn1::time::asn1_time_to_chrono(&current.validity().not_after);
            if not_after < now {
                csca_expired = true;
            }
            break;
        }

        depth += 1;
        if depth > MAX_DEPTH {
            error_message = Some(format!("trust chain exceeded maximum depth of {MAX_DEPTH}"));
            error_code = Some("MAX_DEPTH_EXCEEDED");
            signature_valid = false;
            break;
        }

        let issuer_dn = render_dn_rfc2253(current.issuer());
        if !visited.insert(issuer_dn.clone()) {
            error_message = Some(format!("circular reference detected at DN {issuer_dn}"));
            error_code = Some("CIRCULAR_REFERENCE");
            signature_valid = false;
            break;
        }

        let candidates: Vec<&ChainCandidate> = universe
            .iter()
            .filter(|c| c.subject_dn.eq_ignore_ascii_case(&issuer_dn))
            .collect();

        if candidates.is_empty() {
            error_message = Some(format!("issuing CSCA not found for DN {issuer_dn}"));
            error_code = Some("CSCA_NOT_FOUND");
            signature_valid = false;
            break;
        }

        // Key rollover: several CSCAs may share this subject DN. Disambiguate
        // by signature, not by iteration order (spec §8 invariant 6).
        let mut matched_der: Option<Vec<u8>> = None;
        for candidate in &candidates {
            if let Ok((_, candidate_cert)) = X509Certificate::from_der(&candidate.der) {
                if verify_signed_by(&current, &candidate_cert).unwrap_or(false) {
                    matched_der = Some(candidate.der.clone());
                    break;
                }
            }
        }

        match matched_der {
            Some(der) => {
                let (_, next_cert) = X509Certificate::from_der(&der)
                    .map_err(|e| PkdError::X509Parse(format!("candidate decode failed: {e}")))?;
                let subject = render_dn_rfc2253(next_cert.subject());
                path.push(common_name_or_full(&subject));
                drop(next_cert);
                current_der = der;
            }
            None => {
                // No candidate verifies; fall back to the first DN match for
                // diagnostic output but mark the chain invalid.
                signature_valid = false;
                if let Ok((_, fallback_cert)) = X509Certificate::from_der(&candidates[0].der) {
                    let subject = render_dn_rfc2253(fallback_cert.subject());
                    path.push(format!("{} (signature unverified)", common_name_or_full(&subject)));
                    csca_subject_dn = Some(subject);
                }
                error_message = Some(format!(
                    "no candidate CSCA for DN {issuer_dn} verifies the signature"
                ));
                error_code = Some("CSCA_SIGNATURE_INVALID");
                break;
            }
        }
    }

    let is_valid = signature_valid && csca_found;

    Ok(ChainOutcome {
        is_valid,
        csca_found,
        signature_valid,
        not_expired: !dsc_expired,
        dsc_expired,
        csca_expired,
        csca_subject_dn,
        trust_chain_path: path.join(" \u{2192} "),
        error_message,
        error_code,
    })
}

/// Apply the hybrid chain model (spec §4.8 "Chain validation") to decide
/// the final `ValidationStatus` for a leaf certificate given its chain
/// outcome: signature failures are always hard; expiration of the leaf
/// downgrades to `EXPIRED_VALID` rather than `INVALID` as long as the
/// chain itself verifies; CSCA/link expiration is purely informational.
pub fn decide_validation_status(chain: &ChainOutcome) -> ValidationStatus {
    if !chain.signature_valid || !chain.csca_found {
        return ValidationStatus::Invalid;
    }
    if chain.dsc_expired {
        return ValidationStatus::ExpiredValid;
    }
    ValidationStatus::Valid
}

fn common_name_or_full(dn: &str) -> String {
    dn.split(',')
        .find(|rdn| rdn.trim_start().to_ascii_uppercase().starts_with("CN="))
        .map(|rdn| rdn.trim().to_string())
        .unwrap_or_else(|| dn.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_check_flags_missing_ca_bit_as_warning_not_invalid() {
        let check = SelfSignedCheck {
            subject_equals_issuer: true,
            signature_verified: true,
            is_ca: false,
            key_cert_sign: true,
        };
        assert!(check.is_warning());
        assert!(!check.is_fully_valid());
    }

    #[test]
    fn common_name_extraction_prefers_cn_rdn() {
        assert_eq!(common_name_or_full("CN=CSCA-TEST,C=KR"), "CN=CSCA-TEST");
        assert_eq!(common_name_or_full("O=NoCN,C=KR"), "O=NoCN,C=KR");
    }

    #[test]
    fn decide_status_marks_invalid_on_broken_signature() {
        let outcome = ChainOutcome {
            is_valid: false,
            csca_found: true,
            signature_valid: false,
            not_expired: true,
            dsc_expired: false,
            csca_expired: false,
            csca_subject_dn: None,
            trust_chain_path: "DSC".to_string(),
            error_message: None,
            error_code: None,
        };
        assert_eq!(decide_validation_status(&outcome), ValidationStatus::Invalid);
    }

    #[test]
    fn decide_status_marks_expired_valid_when_chain_ok_but_leaf_expired() {
        let outcome = ChainOutcome {
            is_valid: true,
            csca_found: true,
            signature_valid: true,
            not_expired: false,
            dsc_expired: true,
            csca_expired: false,
            csca_subject_dn: Some("CN=CSCA".to_string()),
            trust_chain_path: "DSC \u{2192} CN=CSCA".to_string(),
            error_message: None,
            error_code: None,
        };
        assert_eq!(decide_validation_status(&outcome), ValidationStatus::ExpiredValid);
    }
}
