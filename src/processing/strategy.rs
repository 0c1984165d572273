//! Shared processing machinery (spec §4.10, C10): the per-artifact
//! classify → validate → persist → mirror pipeline both strategies drive,
//! plus the `ProcessingStrategy` interface itself.

use std::sync::Arc;
use uuid::Uuid;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use async_trait::async_trait;

use crate::asn1::dn::{extract_country_code, render_dn_rfc2253};
use crate::asn1::fingerprint::sha256_hex;
use crate::asn1::time::asn1_time_to_chrono;
use crate::classify::{self, Origin};
use crate::config::CmsVerifyPolicy;
use crate::db::repo::{
    CertificateRepository, CrlRepository, MasterListRepository, UploadStatisticsDelta, ValidationRepository,
};
use crate::error::{PkdError, Result};
use crate::ldap::{DnScheme, LdapDirectoryWriter};
use crate::ldif::parser::LdifEntry;
use crate::model::{Certificate, CertificateType, MasterListRecord, RevokedCertificate, ValidationResult};
use crate::progress::{ProgressEvent, ProgressManager, Stage};
use crate::trustchain::engine::{build_and_validate_chain, decide_validation_status, ChainCandidate};

/// Everything a processing strategy needs, bundled so
/// [`ProcessingStrategy`] methods don't carry a dozen positional arguments.
/// An absent `ldap_writer` means "dual-write is not required for this
/// call" -- AUTO mode treats that as a hard precondition failure itself
/// (spec §4.10), this struct just carries the `Option`.
pub struct ProcessingDeps {
    pub certificate_repo: Arc<dyn CertificateRepository>,
    pub crl_repo: Arc<dyn CrlRepository>,
    pub masterlist_repo: Arc<dyn MasterListRepository>,
    pub validation_repo: Arc<dyn ValidationRepository>,
    pub ldap_writer: Option<Arc<dyn LdapDirectoryWriter>>,
    pub progress: ProgressManager,
    pub trust_anchor_der: Option<Vec<u8>>,
    pub cms_verify_policy: CmsVerifyPolicy,
    pub dn_scheme: DnScheme,
}

/// Running totals accumulated over an upload, mirrored into
/// `UploadRepository::update_statistics` at the end of a pass.
#[derive(Debug, Default)]
pub struct RunningCounts {
    pub stats: UploadStatisticsDelta,
    pub processed: u32,
    pub total: u32,
}

impl RunningCounts {
    fn note_certificate(&mut self, cert_type: CertificateType, status: crate::model::ValidationStatus) {
        use crate::model::ValidationStatus;
        match cert_type {
            CertificateType::Csca => self.stats.csca_count += 1,
            CertificateType::Dsc => self.stats.dsc_count += 1,
            CertificateType::DscNc => self.stats.dsc_nc_count += 1,
            CertificateType::Mlsc => self.stats.mlsc_count += 1,
        }
        match status {
            ValidationStatus::Valid | ValidationStatus::ExpiredValid => self.stats.valid_count += 1,
            ValidationStatus::Invalid | ValidationStatus::Error => self.stats.invalid_count += 1,
            ValidationStatus::Warning => self.stats.warning_count += 1,
            ValidationStatus::Pending => {}
        }
    }
}

#[async_trait]
pub trait ProcessingStrategy: Send + Sync {
    async fn process_ldif_entries(&self, upload_id: Uuid, entries: Vec<LdifEntry>, deps: &ProcessingDeps) -> Result<RunningCounts>;
    async fn process_master_list_content(&self, upload_id: Uuid, bytes: &[u8], deps: &ProcessingDeps) -> Result<RunningCounts>;
}

/// DN-container hint that decides [`Origin`] for an LDIF-sourced
/// certificate (spec §4.9): `dc=nc-data` marks a non-conformant DSC,
/// `o=mlsc` marks a Master List signer certificate, anything else is the
/// conformant subtree.
pub fn origin_for_dn(dn: &str) -> Origin {
    let lower = dn.to_ascii_lowercase();
    if lower.contains("o=mlsc") {
        Origin::LdifMasterListSigner
    } else if lower.contains("dc=nc-data") {
        Origin::LdifNonConformant
    } else {
        Origin::LdifConformant
    }
}

/// Parse, classify, validate, persist (and, when a writer is present,
/// mirror to LDAP) a single certificate. Per-entry failures never abort
/// the caller's loop (spec §7 "Propagation policy") -- they are logged by
/// the caller and reflected back through the certificate's own
/// `validation_status`.
pub async fn ingest_certificate(
    upload_id: Uuid,
    der: &[u8],
    origin: Origin,
    deps: &ProcessingDeps,
    counts: &mut RunningCounts,
) -> Result<()> {
    let (_, parsed) = X509Certificate::from_der(der)
        .map_err(|e| PkdError::X509Parse(format!("certificate decode failed: {e}")))?;

    let certificate_type = classify::classify(&parsed, origin);
    let subject_dn = render_dn_rfc2253(parsed.subject());
    let issuer_dn = render_dn_rfc2253(parsed.issuer());
    let country_code = extract_country_code(&subject_dn);
    let fingerprint_sha256 = sha256_hex(der);
    let not_before = asn1_time_to_chrono(&parsed.validity().not_before);
    let not_after = asn1_time_to_chrono(&parsed.validity().not_after);
    let serial_number = hex::encode_upper(parsed.raw_serial());
    drop(parsed);

    let (validation_status, validation_message) = if certificate_type == CertificateType::Csca {
        // Self-validation only (spec §4.8 "CSCA self-validation"); chain
        // building is for DSCs and link certs, not roots themselves.
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkdError::X509Parse(format!("certificate decode failed: {e}")))?;
        let check = crate::trustchain::engine::validate_csca_self_signed(&cert);
        if check.is_fully_valid() {
            (crate::model::ValidationStatus::Valid, None)
        } else if check.is_warning() {
            (crate::model::ValidationStatus::Warning, Some("self-signed CSCA missing CA/keyCertSign flags".to_string()))
        } else {
            (crate::model::ValidationStatus::Invalid, Some("CSCA self-signature verification failed".to_string()))
        }
    } else {
        let universe = build_candidate_universe(&issuer_dn, deps).await?;
        let outcome = build_and_validate_chain(der, &universe, "DSC")?;
        let status = decide_validation_status(&outcome);
        persist_validation_result(upload_id, der, &outcome, certificate_type, &fingerprint_sha256, &subject_dn, &issuer_dn, &serial_number, &country_code, not_before, not_after, status, deps).await?;
        (status, outcome.error_message)
    };

    let certificate = Certificate {
        id: Uuid::new_v4(),
        upload_id,
        certificate_type,
        country_code,
        subject_dn,
        issuer_dn,
        serial_number,
        fingerprint_sha256,
        not_before,
        not_after,
        certificate_binary: der.to_vec(),
        validation_status,
        validation_message,
        ldap_dn: None,
        stored_in_ldap: false,
        stored_at: None,
    };

    let (cert_id, is_duplicate) = deps.certificate_repo.save_certificate_with_duplicate_check(&certificate).await?;
    if is_duplicate {
        deps.certificate_repo.track_certificate_duplicate(upload_id, &certificate.fingerprint_sha256).await?;
    }

    if let Some(writer) = &deps.ldap_writer {
        let (_, cert_for_dn) = X509Certificate::from_der(der)
            .map_err(|e| PkdError::X509Parse(format!("certificate decode failed: {e}")))?;
        let is_link = certificate_type == CertificateType::Csca && !classify::is_self_signed(&cert_for_dn);
        drop(cert_for_dn);
        match writer.write_certificate(&certificate, deps.dn_scheme, is_link).await {
            Ok(written) => {
                deps.certificate_repo.update_certificate_ldap_status(cert_id, &written.dn).await?;
            }
            Err(e) => {
                // LDAP per-entry failure degrades storedInLdap but does not
                // abort the remaining entries (spec §7).
                tracing::warn!(error = %e, certificate_id = %cert_id, "LDAP mirror failed for certificate");
            }
        }
    }

    counts.note_certificate(certificate_type, validation_status);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn persist_validation_result(
    upload_id: Uuid,
    der: &[u8],
    outcome: &crate::trustchain::engine::ChainOutcome,
    certificate_type: CertificateType,
    fingerprint: &str,
    subject_dn: &str,
    issuer_dn: &str,
    serial_number: &str,
    country_code: &str,
    not_before: chrono::DateTime<chrono::Utc>,
    not_after: chrono::DateTime<chrono::Utc>,
    status: crate::model::ValidationStatus,
    deps: &ProcessingDeps,
) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| PkdError::X509Parse(format!("certificate decode failed: {e}")))?;
    let is_self_signed = classify::is_self_signed(&cert);
    let is_ca = cert.basic_constraints().ok().flatten().map(|bc| bc.value.ca).unwrap_or(false);

    let result = ValidationResult {
        certificate_id: Uuid::new_v4(),
        upload_id,
        fingerprint: fingerprint.to_string(),
        subject_dn: subject_dn.to_string(),
        issuer_dn: issuer_dn.to_string(),
        serial_number: serial_number.to_string(),
        certificate_type,
        country_code: country_code.to_string(),
        trust_chain_valid: outcome.is_valid,
        trust_chain_message: outcome.error_message.clone().unwrap_or_else(|| "trust chain verified".to_string()),
        trust_chain_path: outcome.trust_chain_path.clone(),
        csca_found: outcome.csca_found,
        csca_subject_dn: outcome.csca_subject_dn.clone(),
        signature_verified: outcome.signature_valid,
        signature_algorithm: String::new(),
        validity_check_passed: outcome.not_expired && !outcome.dsc_expired,
        is_expired: outcome.dsc_expired,
        is_not_yet_valid: outcome.error_code == Some("NOT_YET_VALID"),
        not_before,
        not_after,
        is_ca,
        is_self_signed,
        path_length_constraint: None,
        key_usage_valid: true,
        key_usage_flags: Vec::new(),
        crl_check_status: None,
        crl_check_message: None,
        error_code: outcome.error_code.map(str::to_string),
        error_message: outcome.error_message.clone(),
        validation_duration_ms: 0,
        validation_status: status,
    };

    deps.validation_repo.save(&result).await
}

/// Pre-fetch the candidate CSCA arena for a target certificate's issuer DN
/// (spec §4.8 "given the target certificate and a candidate CSCA set").
async fn build_candidate_universe(issuer_dn: &str, deps: &ProcessingDeps) -> Result<Vec<ChainCandidate>> {
    let cscas = deps.certificate_repo.find_all_cscas_by_subject_dn(issuer_dn).await?;
    Ok(cscas
        .into_iter()
        .map(|c| ChainCandidate {
            subject_dn: c.subject_dn,
            der: c.certificate_binary,
        })
        .collect())
}

/// Parse, persist, and (when a writer is present) mirror a CRL.
pub async fn ingest_crl(upload_id: Uuid, der: &[u8], deps: &ProcessingDeps) -> Result<()> {
    let parsed = crate::crl::parse(der)?;

    let crl = crate::model::Crl {
        id: Uuid::new_v4(),
        upload_id,
        country_code: parsed.country_code,
        issuer_dn: parsed.issuer_dn,
        this_update: parsed.this_update,
        next_update: parsed.next_update,
        crl_number: parsed.crl_number,
        fingerprint_sha256: parsed.fingerprint_sha256,
        crl_binary: der.to_vec(),
        validation_status: crate::model::ValidationStatus::Valid,
        ldap_dn: None,
        stored_in_ldap: false,
    };

    let crl_id = deps.crl_repo.save(&crl).await?;
    for revoked in parsed.revoked {
        deps.crl_repo
            .save_revoked_certificate(&RevokedCertificate {
                id: Uuid::new_v4(),
                crl_id,
                serial_number: revoked.serial_number,
                revocation_date: revoked.revocation_date,
                revocation_reason: revoked.revocation_reason,
            })
            .await?;
    }

    if let Some(writer) = &deps.ldap_writer {
        match writer.write_crl(&crl, deps.dn_scheme).await {
            Ok(written) => deps.crl_repo.update_ldap_status(crl_id, &written.dn).await?,
            Err(e) => tracing::warn!(error = %e, crl_id = %crl_id, "LDAP mirror failed for CRL"),
        }
    }

    Ok(())
}

/// Parse a nested Master List (spec §4.7), persist every embedded CSCA via
/// [`ingest_certificate`], and persist + mirror the Master List record
/// itself.
pub async fn ingest_master_list(
    upload_id: Uuid,
    bytes: &[u8],
    deps: &ProcessingDeps,
    counts: &mut RunningCounts,
) -> Result<()> {
    let trust_anchor = match &deps.trust_anchor_der {
        Some(der) => Some(
            X509Certificate::from_der(der)
                .map_err(|e| PkdError::X509Parse(format!("trust anchor decode failed: {e}")))?
                .1,
        ),
        None => None,
    };

    let extracted = crate::cms::extractor::extract_master_list(bytes, trust_anchor.as_ref(), deps.cms_verify_policy)?;
    counts.total += extracted.csca_certificates.len() as u32;

    for der in &extracted.csca_certificates {
        if let Err(e) = ingest_certificate(upload_id, der, Origin::MasterList, deps, counts).await {
            tracing::warn!(error = %e, "failed to ingest a Master List member certificate");
        }
        counts.processed += 1;
    }

    let signer_country = extracted
        .csca_certificates
        .first()
        .map(|der| {
            X509Certificate::from_der(der)
                .map(|(_, c)| extract_country_code(&render_dn_rfc2253(c.issuer())))
                .unwrap_or_else(|_| "XX".to_string())
        })
        .unwrap_or_else(|| "XX".to_string());

    let record = MasterListRecord {
        id: Uuid::new_v4(),
        upload_id,
        signer_country,
        signer_dn: String::new(),
        version: extracted.version.map(|v| v as i32),
        csca_certificate_count: extracted.csca_certificates.len() as u32,
        fingerprint_sha256: sha256_hex(bytes),
        ml_binary: bytes.to_vec(),
        ldap_dn: None,
        stored_in_ldap: false,
    };

    let ml_id = deps.masterlist_repo.save(&record).await?;
    if let Some(writer) = &deps.ldap_writer {
        match writer.write_master_list(&record, deps.dn_scheme).await {
            Ok(written) => deps.masterlist_repo.update_ldap_status(ml_id, &written.dn).await?,
            Err(e) => tracing::warn!(error = %e, master_list_id = %ml_id, "LDAP mirror failed for Master List"),
        }
    }

    Ok(())
}

/// Shared fakes for [`ProcessingDeps`] used by both strategies' unit tests;
/// a real writer/repo needs a live pool, out of scope here.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::repo::{CertificateFilter, CertificateRepository, CrlRepository, MasterListRepository, ValidationRepository};
    use crate::model::{RevokedCertificate, ValidationResult};

    pub struct NoopCertRepo;
    #[async_trait]
    impl CertificateRepository for NoopCertRepo {
        async fn save_certificate_with_duplicate_check(&self, _cert: &Certificate) -> Result<(Uuid, bool)> {
            Ok((Uuid::new_v4(), false))
        }
        async fn update_certificate_ldap_status(&self, _id: Uuid, _dn: &str) -> Result<()> {
            Ok(())
        }
        async fn find_all_cscas_by_subject_dn(&self, _dn: &str) -> Result<Vec<Certificate>> {
            Ok(Vec::new())
        }
        async fn search(&self, _filter: &CertificateFilter) -> Result<Vec<Certificate>> {
            Ok(Vec::new())
        }
        async fn count_ldap_status_by_upload_id(&self, _upload_id: Uuid) -> Result<(u64, u64)> {
            Ok((0, 0))
        }
        async fn track_certificate_duplicate(&self, _upload_id: Uuid, _fingerprint: &str) -> Result<()> {
            Ok(())
        }
        async fn get_distinct_countries(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    pub struct NoopCrlRepo;
    #[async_trait]
    impl CrlRepository for NoopCrlRepo {
        async fn save(&self, crl: &crate::model::Crl) -> Result<Uuid> {
            Ok(crl.id)
        }
        async fn save_revoked_certificate(&self, _revoked: &RevokedCertificate) -> Result<()> {
            Ok(())
        }
        async fn update_ldap_status(&self, _id: Uuid, _dn: &str) -> Result<()> {
            Ok(())
        }
    }

    pub struct NoopMlRepo;
    #[async_trait]
    impl MasterListRepository for NoopMlRepo {
        async fn save(&self, record: &MasterListRecord) -> Result<Uuid> {
            Ok(record.id)
        }
        async fn update_ldap_status(&self, _id: Uuid, _dn: &str) -> Result<()> {
            Ok(())
        }
        async fn find_by_upload_id(&self, _upload_id: Uuid) -> Result<Vec<MasterListRecord>> {
            Ok(Vec::new())
        }
    }

    pub struct NoopValidationRepo;
    #[async_trait]
    impl ValidationRepository for NoopValidationRepo {
        async fn save(&self, _result: &ValidationResult) -> Result<()> {
            Ok(())
        }
        async fn get_reason_breakdown(&self) -> Result<Vec<(String, u64)>> {
            Ok(Vec::new())
        }
        async fn find_by_fingerprint(&self, _fingerprint: &str) -> Result<Option<ValidationResult>> {
            Ok(None)
        }
        async fn find_by_subject_dn(&self, _subject_dn: &str) -> Result<Vec<ValidationResult>> {
            Ok(Vec::new())
        }
    }

    pub fn deps_without_ldap() -> ProcessingDeps {
        ProcessingDeps {
            certificate_repo: std::sync::Arc::new(NoopCertRepo),
            crl_repo: std::sync::Arc::new(NoopCrlRepo),
            masterlist_repo: std::sync::Arc::new(NoopMlRepo),
            validation_repo: std::sync::Arc::new(NoopValidationRepo),
            ldap_writer: None,
            progress: crate::progress::ProgressManager::new(),
            trust_anchor_der: None,
            cms_verify_policy: CmsVerifyPolicy::Permissive,
            dn_scheme: crate::ldap::DnScheme::V2,
        }
    }
}

/// Emit a progress event coalesced to roughly every `interval` processed
/// entries, plus unconditionally at `processed == total` (spec §4.10
/// "Emit a progress event every N (~10-50) entries plus always the
/// final one").
pub fn maybe_emit_progress(
    deps: &ProcessingDeps,
    upload_id: Uuid,
    stage: Stage,
    processed: u32,
    total: u32,
    interval: u32,
) {
    if total == 0 {
        return;
    }
    if processed % interval.max(1) != 0 && processed != total {
        return;
    }
    let percentage = ((processed as u64 * 100) / total as u64).min(100) as u8;
    let event = ProgressEvent::new(upload_id, stage, percentage, chrono::Utc::now()).with_counts(processed as u64, total as u64);
    deps.progress.send_progress(event);
}
