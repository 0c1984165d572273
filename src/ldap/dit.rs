//! DIT layout and DN construction (spec §4.5, §6 "LDAP DIT (bit-exact
//! contract)").
//!
//! The tree is rooted at a configured base DN with two parallel subtrees,
//! `dc=download/dc=data/c={CC}/o={csca|dsc|lc|mlsc|crl|ml}` for conformant
//! material and `dc=download/dc=nc-data/c={CC}/o=dsc` for non-conformant
//! DSCs. Two DN schemes coexist (spec §4.5): legacy v1 keys on the escaped
//! subject DN plus serial, v2 (preferred for new writes) keys on the
//! fingerprint alone.

use crate::asn1::dn::escape_rdn_value;
use crate::model::CertificateType;

/// Which DN construction scheme produced a given LDAP entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnScheme {
    /// `cn={ESCAPED_SUBJECT_DN}+sn={SERIAL}`
    V1,
    /// `cn={SHA256_FINGERPRINT}`
    V2,
}

/// The `o=...` container a certificate belongs in. Link CSCAs (subject !=
/// issuer, CA=true) get their own `o=lc` container even though they are
/// classified `CertificateType::Csca` in the relational store (spec §4.9
/// keeps them CSCA for chain-building purposes; §4.5's DIT still wants
/// them visually distinguished from root CSCAs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Csca,
    Dsc,
    Lc,
    Mlsc,
    Crl,
    Ml,
}

impl Container {
    pub fn as_str(self) -> &'static str {
        match self {
            Container::Csca => "csca",
            Container::Dsc => "dsc",
            Container::Lc => "lc",
            Container::Mlsc => "mlsc",
            Container::Crl => "crl",
            Container::Ml => "ml",
        }
    }
}

/// Decide the `o=...` container for a certificate. `is_link` disambiguates
/// a link CSCA (subject != issuer but still CA=true, see [`crate::classify`])
/// from a root CSCA; it is meaningless for any other certificate type.
pub fn container_ou(cert_type: CertificateType, is_link: bool) -> Container {
    match cert_type {
        CertificateType::Csca if is_link => Container::Lc,
        CertificateType::Csca => Container::Csca,
        CertificateType::Dsc | CertificateType::DscNc => Container::Dsc,
        CertificateType::Mlsc => Container::Mlsc,
    }
}

/// `data` for every conformant entity, `nc-data` for a non-conformant DSC
/// (spec §4.5's second subtree).
pub fn data_subtree(cert_type: CertificateType, data_container: &str, nc_data_container: &str) -> String {
    match cert_type {
        CertificateType::DscNc => nc_data_container.to_string(),
        _ => data_container.to_string(),
    }
}

/// Render the country + container + download-subtree suffix shared by
/// every DN scheme: `o={ou},c={cc},dc={subtree},dc=download,{base}`.
fn suffix(ou: Container, country_code: &str, subtree: &str, base_dn: &str) -> String {
    format!(
        "o={},c={},dc={},dc=download,{}",
        ou.as_str(),
        country_code.to_uppercase(),
        subtree,
        base_dn
    )
}

/// Legacy v1 DN: a multi-valued `cn=...+sn=...` RDN keeps the subject DN
/// searchable while isolating its special characters into an escaped RDN
/// value, with the serial as a second co-located attribute (spec §4.5).
pub fn v1_dn(subject_dn: &str, serial_hex: &str, ou: Container, country_code: &str, subtree: &str, base_dn: &str) -> String {
    format!(
        "cn={}+sn={},{}",
        escape_rdn_value(subject_dn),
        escape_rdn_value(serial_hex),
        suffix(ou, country_code, subtree, base_dn)
    )
}

/// v2 DN (preferred for new writes): fixed-length, collision-free, and
/// requires no escaping since a hex digest contains no RFC 4514 specials.
pub fn v2_dn(fingerprint_sha256: &str, ou: Container, country_code: &str, subtree: &str, base_dn: &str) -> String {
    format!("cn={},{}", fingerprint_sha256, suffix(ou, country_code, subtree, base_dn))
}

/// The RDN-only container DNs that must exist before an entry's DN is valid:
/// `c={CC},dc={subtree},dc=download,{base}` then `o={ou},c={CC},...`.
pub fn required_containers(ou: Container, country_code: &str, subtree: &str, base_dn: &str) -> Vec<String> {
    let country_dn = format!("c={},dc={},dc=download,{}", country_code.to_uppercase(), subtree, base_dn);
    let ou_dn = format!("o={},{}", ou.as_str(), country_dn);
    vec![country_dn, ou_dn]
}
