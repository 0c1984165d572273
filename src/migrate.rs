//! v1-to-v2 LDAP DN migration (spec §4.5, §B.3): re-derive the fingerprint
//! DN for every certificate row still addressed by a legacy
//! `cn={subject}+sn={serial}` DN and re-point the DB's `ldap_dn` column at
//! the rewritten entry.
//!
//! This is a C5/C4 joint operation: [`crate::ldap::LdapDirectoryWriter`]
//! does the actual add/modify, [`crate::db::repo::CertificateRepository`]
//! supplies the candidates and records the result. There is no dedicated
//! "still on v1" query, so candidates are found by scanning every stored
//! row and inspecting the shape of its `ldap_dn` -- a v1 DN's first RDN is
//! always multi-valued (`cn=...+sn=...`), a v2 DN's never is.

use crate::db::repo::{CertificateFilter, CertificateRepository};
use crate::error::Result;
use crate::ldap::{DnScheme, LdapDirectoryWriter};
use crate::model::CertificateType;

/// Outcome of one migration batch run (surfaced by
/// `POST /api/internal/migrate-ldap-dns`).
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub candidates: u32,
    pub migrated: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// A certificate's `ldap_dn` is legacy-shaped if its first RDN is the
/// multi-valued `cn={escaped-subject}+sn={serial}` pair. A v2 DN's `cn`
/// value is a bare hex digest and carries no `+sn=` co-value.
fn is_v1_shaped(dn: &str) -> bool {
    dn.split(',').next().is_some_and(|rdn| rdn.contains("+sn="))
}

fn is_link_csca(cert_type: CertificateType, subject_dn: &str, issuer_dn: &str) -> bool {
    cert_type == CertificateType::Csca && !subject_dn.eq_ignore_ascii_case(issuer_dn)
}

/// Walk every certificate still on a v1 DN, rewrite it to v2, and update
/// the DB pointer. Per-row failures are logged and counted, not fatal to
/// the batch -- a single bad LDAP write must not abort migration for every
/// other country's entries.
pub async fn migrate_dn_scheme(
    certificate_repo: &dyn CertificateRepository,
    ldap_writer: &dyn LdapDirectoryWriter,
) -> Result<MigrationReport> {
    let all = certificate_repo.search(&CertificateFilter::default()).await?;
    let mut report = MigrationReport::default();

    for cert in all {
        let Some(current_dn) = cert.ldap_dn.as_deref() else {
            continue; // never written to LDAP, not a migration candidate
        };
        if !is_v1_shaped(current_dn) {
            continue;
        }
        report.candidates += 1;

        let is_link = is_link_csca(cert.certificate_type, &cert.subject_dn, &cert.issuer_dn);
        match ldap_writer.write_certificate(&cert, DnScheme::V2, is_link).await {
            Ok(entry) if entry.dn == current_dn => {
                // fingerprint happened to already match; nothing to repoint
                report.skipped += 1;
            }
            Ok(entry) => match certificate_repo.update_certificate_ldap_status(cert.id, &entry.dn).await {
                Ok(()) => {
                    tracing::info!(certificate_id = %cert.id, old_dn = %current_dn, new_dn = %entry.dn, "migrated LDAP DN to v2");
                    report.migrated += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, certificate_id = %cert.id, "wrote v2 LDAP entry but failed to update DB pointer");
                    report.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, certificate_id = %cert.id, dn = %current_dn, "failed to write v2 LDAP entry during migration");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_dn_is_recognized_by_its_multivalued_first_rdn() {
        assert!(is_v1_shaped("cn=CN\\=A\\, Inc.+sn=01FF,o=dsc,c=DE,dc=data,dc=download,dc=pkd"));
    }

    #[test]
    fn v2_dn_is_not_mistaken_for_v1() {
        let fingerprint = "a".repeat(64);
        assert!(!is_v1_shaped(&format!("cn={fingerprint},o=csca,c=KR,dc=data,dc=download,dc=pkd")));
    }

    #[test]
    fn link_csca_is_detected_by_subject_issuer_mismatch() {
        assert!(is_link_csca(CertificateType::Csca, "cn=a", "cn=b"));
        assert!(!is_link_csca(CertificateType::Csca, "cn=a", "cn=a"));
        assert!(!is_link_csca(CertificateType::Dsc, "cn=a", "cn=b"));
    }
}
