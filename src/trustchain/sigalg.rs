//! Raw X.509 signature verification against an issuer's public key.
//!
//! Grounded on the OID-to-`ring`-algorithm mapping used throughout the
//! corpus for DDS/X.509 auth (see DESIGN.md): the certificate's
//! `signatureAlgorithm` OID selects a `ring::signature::VerificationAlgorithm`,
//! the issuer's raw SPKI bytes become the public key, and `tbsCertificate` /
//! `signatureValue` are verified directly -- no chain-of-trust assumptions,
//! just "did this key produce this signature".

use ring::signature::{self, VerificationAlgorithm};
use x509_parser::certificate::X509Certificate;

/// Map a certificate's `signatureAlgorithm` OID to a `ring` verifier.
/// Unknown/unsupported OIDs (MD5, SHA-1 RSA, etc.) return `None` -- callers
/// treat that as a signature verification failure, never a panic.
pub fn verification_algorithm_for_oid(oid: &str) -> Option<&'static dyn VerificationAlgorithm> {
    match oid {
        "1.2.840.113549.1.1.11" => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
        "1.2.840.113549.1.1.12" => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
        "1.2.840.113549.1.1.13" => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
        "1.2.840.10045.4.3.2" => Some(&signature::ECDSA_P256_SHA256_ASN1),
        "1.2.840.10045.4.3.3" => Some(&signature::ECDSA_P384_SHA384_ASN1),
        _ => None,
    }
}

/// Verify that `subject` was signed by `issuer`'s public key.
///
/// Returns `Ok(true)` / `Ok(false)` for a completed verification attempt;
/// `Err` only for a signature algorithm we don't recognize, which the chain
/// engine (C8) treats the same as a failed verification but reports
/// distinctly in `trustChainMessage`.
pub fn verify_signed_by(subject: &X509Certificate, issuer: &X509Certificate) -> Result<bool, String> {
    let oid = subject.signature_algorithm.algorithm.to_id_string();
    let algorithm = verification_algorithm_for_oid(&oid)
        .ok_or_else(|| format!("unsupported signature algorithm OID {oid}"))?;

    let issuer_spki = &issuer.public_key().subject_public_key.data;
    let tbs = subject.tbs_certificate.as_ref();
    let signature_value = subject.signature_value.as_ref();

    let public_key = signature::UnparsedPublicKey::new(algorithm, issuer_spki);
    Ok(public_key.verify(tbs, signature_value).is_ok())
}

/// Verify an arbitrary (content, signature) pair against a certificate's
/// public key, used by the CMS extractor (C7) to check a Master List's
/// signature against a configured trust anchor rather than an embedded
/// signer certificate.
///
/// The anchor's own key type picks the digest: SHA-256 for RSA and P-256
/// EC keys, SHA-384 for P-384 EC keys, matching observed ICAO CSCA/MLSC
/// signing practice (see DESIGN.md "CMS trust-anchor verification").
pub fn verify_with_anchor(content: &[u8], signature_bytes: &[u8], anchor: &X509Certificate) -> Result<bool, String> {
    let key = anchor.public_key();
    let algorithm: &'static dyn VerificationAlgorithm = match key.parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(_)) => &signature::RSA_PKCS1_2048_8192_SHA256,
        Ok(x509_parser::public_key::PublicKey::EC(point)) => {
            if point.data().len() > 97 {
                &signature::ECDSA_P384_SHA384_ASN1
            } else {
                &signature::ECDSA_P256_SHA256_ASN1
            }
        }
        _ => return Err("unsupported trust anchor key type".to_string()),
    };

    let public_key = signature::UnparsedPublicKey::new(algorithm, &key.subject_public_key.data);
    Ok(public_key.verify(content, signature_bytes).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_oid_yields_none() {
        assert!(verification_algorithm_for_oid("9.9.9.9").is_none());
    }

    #[test]
    fn known_oids_resolve() {
        assert!(verification_algorithm_for_oid("1.2.840.113549.1.1.11").is_some());
        assert!(verification_algorithm_for_oid("1.2.840.10045.4.3.2").is_some());
    }
}
