//! Upload ingress and lifecycle coordination (spec §4.12, C12).
//!
//! [`UploadCoordinator`] is the single entry point a transport calls into:
//! sanitize the filename, sniff and size-check the body, hash-dedupe
//! against prior uploads, persist the raw bytes under the upload UUID, and
//! dispatch to whichever processing path the declared mode and file format
//! select. AUTO dispatch runs on a detached background task; everything
//! else (MANUAL stage 1, single cert/CRL ingest, preview) completes before
//! the call returns.

pub mod sanitize;

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use uuid::Uuid;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::asn1::dn::render_dn_rfc2253;
use crate::asn1::fingerprint::sha256_hex;
use crate::classify::{self, Origin};
use crate::config::CmsVerifyPolicy;
use crate::db::repo::{CertificateRepository, CrlRepository, MasterListRepository, UploadRepository, UploadStatisticsDelta, ValidationRepository};
use crate::error::{PkdError, Result};
use crate::ldap::{DnScheme, LdapDirectoryWriter};
use crate::model::{CertificateType, ExistingUploadSummary, FileFormat, ProcessingMode, Upload, UploadStatus};
use crate::processing::{AutoStrategy, ManualArtifact, ManualStrategy, ProcessingDeps, ProcessingStrategy, RunningCounts, SingleFlightRegistry};
use crate::progress::{ProgressEvent, ProgressManager, Stage};
use crate::upload::sanitize::{check_size_cap, format_from_extension, sanitize_filename, sniff_format};

/// Outcome of `UploadCoordinator::accept`: either a fresh upload is now
/// underway, or the SHA-256 already matches a prior upload and the caller
/// should surface a 409 carrying the existing upload's summary (spec
/// §4.12 "no new row, no reprocessing").
pub enum Accepted {
    Started(Upload),
    Duplicate(ExistingUploadSummary),
}

/// Result of a dry-run preview (`POST /api/upload/certificate/preview`):
/// parse + metadata extraction only, nothing persisted.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub file_format: FileFormat,
    pub entry_count: u32,
    pub certificate_type: Option<CertificateType>,
    pub subject_dn: Option<String>,
    pub issuer_dn: Option<String>,
    pub serial_number: Option<String>,
    pub fingerprint_sha256: Option<String>,
}

/// Bundles every dependency the coordinator needs across the lifetime of
/// an upload. Built once at process startup and shared behind an `Arc` by
/// the transport layer.
pub struct UploadCoordinator {
    upload_repo: Arc<dyn UploadRepository>,
    certificate_repo: Arc<dyn CertificateRepository>,
    crl_repo: Arc<dyn CrlRepository>,
    masterlist_repo: Arc<dyn MasterListRepository>,
    validation_repo: Arc<dyn ValidationRepository>,
    ldap_writer: Option<Arc<dyn LdapDirectoryWriter>>,
    progress: ProgressManager,
    trust_anchor_der: Option<Vec<u8>>,
    cms_verify_policy: CmsVerifyPolicy,
    dn_scheme: DnScheme,
    manual: Arc<ManualStrategy>,
    auto: Arc<AutoStrategy>,
    single_flight: Arc<SingleFlightRegistry>,
    upload_dir: PathBuf,
}

#[allow(clippy::too_many_arguments)]
impl UploadCoordinator {
    pub fn new(
        upload_repo: Arc<dyn UploadRepository>,
        certificate_repo: Arc<dyn CertificateRepository>,
        crl_repo: Arc<dyn CrlRepository>,
        masterlist_repo: Arc<dyn MasterListRepository>,
        validation_repo: Arc<dyn ValidationRepository>,
        ldap_writer: Option<Arc<dyn LdapDirectoryWriter>>,
        progress: ProgressManager,
        trust_anchor_der: Option<Vec<u8>>,
        cms_verify_policy: CmsVerifyPolicy,
        dn_scheme: DnScheme,
        upload_dir: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_repo,
            certificate_repo,
            crl_repo,
            masterlist_repo,
            validation_repo,
            ldap_writer,
            progress,
            trust_anchor_der,
            cms_verify_policy,
            dn_scheme,
            manual: Arc::new(ManualStrategy::new(artifact_dir)),
            auto: Arc::new(AutoStrategy::new()),
            single_flight: Arc::new(SingleFlightRegistry::new()),
            upload_dir: upload_dir.into(),
        }
    }

    fn deps(&self) -> ProcessingDeps {
        ProcessingDeps {
            certificate_repo: self.certificate_repo.clone(),
            crl_repo: self.crl_repo.clone(),
            masterlist_repo: self.masterlist_repo.clone(),
            validation_repo: self.validation_repo.clone(),
            ldap_writer: self.ldap_writer.clone(),
            progress: self.progress.clone(),
            trust_anchor_der: self.trust_anchor_der.clone(),
            cms_verify_policy: self.cms_verify_policy,
            dn_scheme: self.dn_scheme,
        }
    }

    /// `POST /api/upload/ldif` and `/api/upload/masterlist` (spec §4.12):
    /// sanitize, sniff, size-check, hash-dedupe, persist, and dispatch.
    pub async fn accept(&self, original_file_name: &str, mode: ProcessingMode, body: Vec<u8>) -> Result<Accepted> {
        let (upload, format) = self.ingest_bulk_or_duplicate(original_file_name, mode, &body).await?;
        let upload = match upload {
            Accepted::Duplicate(summary) => return Ok(Accepted::Duplicate(summary)),
            Accepted::Started(upload) => upload,
        };

        match mode {
            ProcessingMode::Auto => self.dispatch_auto(upload.clone(), format, body),
            ProcessingMode::Manual => self.dispatch_manual_stage_one(&upload, format, body).await?,
        }

        Ok(Accepted::Started(upload))
    }

    /// Shared prefix of `accept`: sanitize/sniff/size-check/hash-dedupe and
    /// persist the body + row, returning the detected format alongside.
    async fn ingest_bulk_or_duplicate(&self, original_file_name: &str, mode: ProcessingMode, body: &[u8]) -> Result<(Accepted, FileFormat)> {
        let sanitized = sanitize_filename(original_file_name)?;
        let format = format_from_extension(&sanitized)?;
        check_size_cap(format, body.len() as u64)?;
        sniff_format(format, body)?;

        let file_hash = sha256_hex(body);
        if let Some(existing) = self.upload_repo.find_by_file_hash(&file_hash).await? {
            return Ok((Accepted::Duplicate(ExistingUploadSummary::from(&existing)), format));
        }

        let upload = self.persist_new_upload(&sanitized, original_file_name, &file_hash, body, format, mode).await?;
        Ok((Accepted::Started(upload), format))
    }

    async fn persist_new_upload(
        &self,
        sanitized_file_name: &str,
        original_file_name: &str,
        file_hash: &str,
        body: &[u8],
        format: FileFormat,
        mode: ProcessingMode,
    ) -> Result<Upload> {
        let id = Uuid::new_v4();
        let file_name = format!("{id}.{}", extension_for(format));
        std::fs::create_dir_all(&self.upload_dir)?;
        let file_path = self.upload_dir.join(&file_name);
        std::fs::write(&file_path, body)?;

        let mut upload = Upload::new(
            file_name,
            original_file_name.to_string(),
            file_hash.to_string(),
            body.len() as u64,
            format,
            mode,
            file_path.display().to_string(),
        );
        upload.id = id;
        let _ = sanitized_file_name;

        self.upload_repo.insert(&upload).await?;
        Ok(upload)
    }

    /// AUTO dispatch: run to completion on a detached task, guarded by the
    /// single-flight registry, with the upload row transitioned to its
    /// terminal state when the task finishes.
    fn dispatch_auto(&self, upload: Upload, format: FileFormat, body: Vec<u8>) {
        if !self.single_flight.try_acquire(upload.id) {
            tracing::warn!(upload_id = %upload.id, "AUTO processing already in flight for this upload, ignoring duplicate launch");
            return;
        }

        let upload_repo = self.upload_repo.clone();
        let progress = self.progress.clone();
        let deps = self.deps();
        let auto = self.auto.clone();
        let single_flight = self.single_flight.clone();
        let upload_id = upload.id;

        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(run_auto_pass(upload_id, format, &body, auto.as_ref(), &deps))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(counts)) => {
                    if let Err(e) = upload_repo.update_statistics(upload_id, &counts.stats).await {
                        tracing::error!(upload_id = %upload_id, error = %e, "failed to persist final statistics");
                    }
                    if let Err(e) = upload_repo.update_progress(upload_id, counts.total, counts.processed).await {
                        tracing::error!(upload_id = %upload_id, error = %e, "failed to persist final progress counters");
                    }
                    if let Err(e) = upload_repo.update_status(upload_id, UploadStatus::Completed, None).await {
                        tracing::error!(upload_id = %upload_id, error = %e, "failed to mark upload COMPLETED");
                    }
                    progress.send_progress(ProgressEvent::new(upload_id, Stage::Completed, 100, chrono::Utc::now()).with_counts(counts.processed as u64, counts.total.max(1) as u64));
                }
                Ok(Err(e)) => {
                    tracing::error!(upload_id = %upload_id, error = %e, "AUTO processing failed");
                    let _ = upload_repo.update_status(upload_id, UploadStatus::Failed, Some(&e.to_string())).await;
                    progress.send_progress(ProgressEvent::failed(upload_id, e.to_string(), chrono::Utc::now()));
                }
                Err(_) => {
                    tracing::error!(upload_id = %upload_id, "AUTO processing task panicked");
                    let _ = upload_repo
                        .update_status(upload_id, UploadStatus::Failed, Some("processing task panicked"))
                        .await;
                    progress.send_progress(ProgressEvent::failed(upload_id, "processing task panicked", chrono::Utc::now()));
                }
            }

            single_flight.release(upload_id);
        });
    }

    /// MANUAL dispatch: stage 1 runs synchronously in the request path
    /// (spec §4.10 autostart always parses), leaving stages 2/3 to
    /// `stage_validate`/`stage_ldap` below.
    async fn dispatch_manual_stage_one(&self, upload: &Upload, format: FileFormat, body: Vec<u8>) -> Result<()> {
        let deps = self.deps();
        match format {
            FileFormat::Ldif => {
                let text = String::from_utf8_lossy(&body);
                let entries = crate::ldif::parser::parse_entries(&text)?;
                self.manual.stage_parse(upload.id, &ManualArtifact::Ldif(entries), &deps)?;
            }
            FileFormat::Ml => {
                self.manual.stage_parse(upload.id, &ManualArtifact::MasterList(body), &deps)?;
            }
            _ => {
                return Err(PkdError::UnsupportedFormat(
                    "MANUAL mode only applies to LDIF and Master List bulk uploads".to_string(),
                ));
            }
        }
        self.upload_repo.update_status(upload.id, UploadStatus::Pending, None).await
    }

    /// `POST /api/upload/{id}/parse`: a no-op for uploads accepted through
    /// `accept`, since stage 1 already ran synchronously at ingest time
    /// (spec §4.10). Re-running would overwrite a stashed artifact that may
    /// already have progressed past stage 1, so this simply confirms the
    /// artifact exists.
    pub fn stage_parse_noop(&self, upload_id: Uuid) -> Result<()> {
        self.manual.load_artifact_exists(upload_id)
    }

    pub async fn stage_validate(&self, upload_id: Uuid) -> Result<RunningCounts> {
        let deps = self.deps();
        let counts = self.manual.stage_validate(upload_id, &deps).await?;
        self.upload_repo.update_statistics(upload_id, &counts.stats).await?;
        self.upload_repo.update_progress(upload_id, counts.total, counts.processed).await?;
        Ok(counts)
    }

    pub async fn stage_ldap(&self, upload_id: Uuid) -> Result<u32> {
        let deps = self.deps();
        let written = self.manual.stage_ldap(upload_id, &deps).await?;
        self.upload_repo.update_status(upload_id, UploadStatus::Completed, None).await?;
        Ok(written)
    }

    /// `DELETE /api/upload/{id}`: drop a stashed MANUAL artifact and mark
    /// the upload FAILED if it isn't already terminal.
    pub async fn delete(&self, upload_id: Uuid) -> Result<()> {
        self.manual.cleanup(upload_id);
        if let Some(upload) = self.upload_repo.find_by_id(upload_id).await? {
            if !matches!(upload.status, UploadStatus::Completed | UploadStatus::Failed) {
                self.upload_repo.update_status(upload_id, UploadStatus::Failed, Some("cancelled by DELETE")).await?;
            }
        }
        Ok(())
    }

    /// `POST /api/upload/certificate[/preview]` single cert/CRL ingest
    /// (spec §4.12, §6). Runs synchronously -- a single entity never
    /// warrants background dispatch -- and always mirrors to LDAP when a
    /// writer is configured, the same as one AUTO-mode entry would.
    pub async fn accept_single(&self, original_file_name: &str, body: Vec<u8>) -> Result<Upload> {
        let sanitized = sanitize_filename(original_file_name)?;
        let format = format_from_extension(&sanitized)?;
        check_size_cap(format, body.len() as u64)?;
        sniff_format(format, &body)?;

        let file_hash = sha256_hex(&body);
        if let Some(existing) = self.upload_repo.find_by_file_hash(&file_hash).await? {
            return Err(PkdError::DuplicateFile { existing_upload_id: existing.id });
        }

        let upload = self.persist_new_upload(&sanitized, original_file_name, &file_hash, &body, format, ProcessingMode::Auto).await?;
        let deps = self.deps();
        let mut counts = RunningCounts::default();
        counts.total = 1;

        let result = match format {
            FileFormat::Crl => crate::processing::strategy::ingest_crl(upload.id, &body, &deps).await,
            FileFormat::Pem | FileFormat::Der | FileFormat::Cer => {
                crate::processing::strategy::ingest_certificate(upload.id, &body, Origin::LdifConformant, &deps, &mut counts).await
            }
            FileFormat::P7b => {
                return Err(PkdError::UnsupportedFormat(
                    "bare PKCS#7 certificate-store bundles (no CMS encapsulated content) are not yet supported; submit the member certificates individually or via an LDIF/Master-List bundle".to_string(),
                ));
            }
            FileFormat::Ldif | FileFormat::Ml => {
                return Err(PkdError::UnsupportedFormat(
                    "bulk formats must go through accept(), not accept_single()".to_string(),
                ));
            }
        };

        counts.processed = 1;
        match result {
            Ok(()) => {
                self.upload_repo.update_statistics(upload.id, &counts.stats).await?;
                self.upload_repo.update_progress(upload.id, 1, 1).await?;
                self.upload_repo.update_status(upload.id, UploadStatus::Completed, None).await?;
                self.progress.send_progress(ProgressEvent::new(upload.id, Stage::Completed, 100, chrono::Utc::now()).with_counts(1, 1));
            }
            Err(e) => {
                self.upload_repo.update_status(upload.id, UploadStatus::Failed, Some(&e.to_string())).await?;
                self.progress.send_progress(ProgressEvent::failed(upload.id, e.to_string(), chrono::Utc::now()));
                return Err(e);
            }
        }

        self.upload_repo.find_by_id(upload.id).await?.ok_or_else(|| PkdError::Unexpected("upload row vanished immediately after insert".to_string()))
    }

    /// Dry-run preview: parse + extract metadata only, nothing persisted,
    /// no row inserted (spec §4.12).
    pub async fn preview(&self, original_file_name: &str, body: Vec<u8>) -> Result<PreviewResult> {
        let sanitized = sanitize_filename(original_file_name)?;
        let format = format_from_extension(&sanitized)?;
        check_size_cap(format, body.len() as u64)?;
        sniff_format(format, &body)?;

        match format {
            FileFormat::Ldif => {
                let text = String::from_utf8_lossy(&body);
                let entries = crate::ldif::parser::parse_entries(&text)?;
                Ok(PreviewResult {
                    file_format: format,
                    entry_count: entries.len() as u32,
                    certificate_type: None,
                    subject_dn: None,
                    issuer_dn: None,
                    serial_number: None,
                    fingerprint_sha256: None,
                })
            }
            FileFormat::Ml => {
                let trust_anchor = match &self.trust_anchor_der {
                    Some(der) => Some(X509Certificate::from_der(der).map_err(|e| PkdError::X509Parse(e.to_string()))?.1),
                    None => None,
                };
                let extracted = crate::cms::extractor::extract_master_list(&body, trust_anchor.as_ref(), self.cms_verify_policy)?;
                Ok(PreviewResult {
                    file_format: format,
                    entry_count: extracted.csca_certificates.len() as u32,
                    certificate_type: Some(CertificateType::Csca),
                    subject_dn: None,
                    issuer_dn: None,
                    serial_number: None,
                    fingerprint_sha256: Some(sha256_hex(&body)),
                })
            }
            FileFormat::Crl => {
                let parsed = crate::crl::parse(&body)?;
                Ok(PreviewResult {
                    file_format: format,
                    entry_count: 1,
                    certificate_type: None,
                    subject_dn: None,
                    issuer_dn: Some(parsed.issuer_dn),
                    serial_number: None,
                    fingerprint_sha256: Some(parsed.fingerprint_sha256),
                })
            }
            FileFormat::Pem | FileFormat::Der | FileFormat::Cer => {
                let (_, cert) = X509Certificate::from_der(&body).map_err(|e| PkdError::X509Parse(format!("certificate decode failed: {e}")))?;
                let certificate_type = classify::classify(&cert, Origin::LdifConformant);
                Ok(PreviewResult {
                    file_format: format,
                    entry_count: 1,
                    certificate_type: Some(certificate_type),
                    subject_dn: Some(render_dn_rfc2253(cert.subject())),
                    issuer_dn: Some(render_dn_rfc2253(cert.issuer())),
                    serial_number: Some(hex::encode_upper(cert.raw_serial())),
                    fingerprint_sha256: Some(sha256_hex(&body)),
                })
            }
            FileFormat::P7b => Err(PkdError::UnsupportedFormat(
                "bare PKCS#7 certificate-store bundles are not supported by preview".to_string(),
            )),
        }
    }
}

async fn run_auto_pass(upload_id: Uuid, format: FileFormat, body: &[u8], auto: &AutoStrategy, deps: &ProcessingDeps) -> Result<RunningCounts> {
    match format {
        FileFormat::Ldif => {
            let text = String::from_utf8_lossy(body);
            let entries = crate::ldif::parser::parse_entries(&text)?;
            auto.process_ldif_entries(upload_id, entries, deps).await
        }
        FileFormat::Ml => auto.process_master_list_content(upload_id, body, deps).await,
        other => Err(PkdError::UnsupportedFormat(format!("{other:?} is not a bulk format usable with AUTO dispatch"))),
    }
}

fn extension_for(format: FileFormat) -> &'static str {
    match format {
        FileFormat::Ldif => "ldif",
        FileFormat::Ml => "ml",
        FileFormat::Pem => "pem",
        FileFormat::Der => "der",
        FileFormat::Cer => "cer",
        FileFormat::P7b => "p7b",
        FileFormat::Crl => "crl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::CertificateFilter;
    use crate::model::{Certificate, Crl, MasterListRecord, RevokedCertificate, ValidationResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MemoryUploadRepo {
        rows: Mutex<Vec<Upload>>,
    }

    #[async_trait]
    impl UploadRepository for MemoryUploadRepo {
        async fn insert(&self, upload: &Upload) -> Result<Uuid> {
            self.rows.lock().unwrap().push(upload.clone());
            Ok(upload.id)
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Upload>> {
            Ok(self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned())
        }
        async fn find_by_file_hash(&self, hash: &str) -> Result<Option<Upload>> {
            Ok(self.rows.lock().unwrap().iter().find(|u| u.file_hash == hash).cloned())
        }
        async fn update_status(&self, id: Uuid, status: UploadStatus, error_message: Option<&str>) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
                u.status = status;
                u.error_message = error_message.map(str::to_string);
            }
            Ok(())
        }
        async fn update_statistics(&self, _id: Uuid, _counts: &UploadStatisticsDelta) -> Result<()> {
            Ok(())
        }
        async fn update_progress(&self, _id: Uuid, _total: u32, _processed: u32) -> Result<()> {
            Ok(())
        }
        async fn get_change_history(&self, _limit: u32) -> Result<Vec<crate::db::repo::upload::UploadHistoryEntry>> {
            Ok(Vec::new())
        }
    }

    struct NoopCertRepo;
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

    struct NoopCrlRepo;
    #[async_trait]
    impl CrlRepository for NoopCrlRepo {
        async fn save(&self, crl: &Crl) -> Result<Uuid> {
            Ok(crl.id)
        }
        async fn save_revoked_certificate(&self, _revoked: &RevokedCertificate) -> Result<()> {
            Ok(())
        }
        async fn update_ldap_status(&self, _id: Uuid, _dn: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoopMlRepo;
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

    struct NoopValidationRepo;
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

    fn coordinator(upload_dir: &std::path::Path, artifact_dir: &std::path::Path) -> UploadCoordinator {
        UploadCoordinator::new(
            Arc::new(MemoryUploadRepo::default()),
            Arc::new(NoopCertRepo),
            Arc::new(NoopCrlRepo),
            Arc::new(NoopMlRepo),
            Arc::new(NoopValidationRepo),
            None,
            ProgressManager::new(),
            None,
            CmsVerifyPolicy::Permissive,
            DnScheme::V2,
            upload_dir.to_path_buf(),
            artifact_dir.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn manual_accept_stashes_an_artifact_and_marks_pending() {
        let upload_dir = tempdir().unwrap();
        let artifact_dir = tempdir().unwrap();
        let coordinator = coordinator(upload_dir.path(), artifact_dir.path());

        let ldif = b"dn: cn=x,c=KR\nobjectClass: top\n\n".to_vec();
        let accepted = coordinator.accept("bundle.ldif", ProcessingMode::Manual, ldif).await.unwrap();
        match accepted {
            Accepted::Started(upload) => {
                assert_eq!(upload.status, UploadStatus::Processing);
                let stored = coordinator.upload_repo.find_by_id(upload.id).await.unwrap().unwrap();
                assert_eq!(stored.status, UploadStatus::Pending);
            }
            Accepted::Duplicate(_) => panic!("expected a fresh upload"),
        }
    }

    #[tokio::test]
    async fn duplicate_file_hash_is_rejected_without_a_new_row() {
        let upload_dir = tempdir().unwrap();
        let artifact_dir = tempdir().unwrap();
        let coordinator = coordinator(upload_dir.path(), artifact_dir.path());

        let ldif = b"dn: cn=x,c=KR\nobjectClass: top\n\n".to_vec();
        coordinator.accept("bundle.ldif", ProcessingMode::Manual, ldif.clone()).await.unwrap();
        let second = coordinator.accept("renamed.ldif", ProcessingMode::Manual, ldif).await.unwrap();
        assert!(matches!(second, Accepted::Duplicate(_)));
    }

    #[tokio::test]
    async fn rejects_empty_or_traversal_filenames() {
        let upload_dir = tempdir().unwrap();
        let artifact_dir = tempdir().unwrap();
        let coordinator = coordinator(upload_dir.path(), artifact_dir.path());

        let result = coordinator.accept("../../etc/passwd.ldif", ProcessingMode::Manual, b"dn: x\n".to_vec()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn preview_counts_ldif_entries_without_persisting() {
        let upload_dir = tempdir().unwrap();
        let artifact_dir = tempdir().unwrap();
        let coordinator = coordinator(upload_dir.path(), artifact_dir.path());

        let ldif = b"dn: cn=a,c=KR\nsn: 1\n\ndn: cn=b,c=KR\nsn: 2\n\n".to_vec();
        let preview = coordinator.preview("bundle.ldif", ldif).await.unwrap();
        assert_eq!(preview.entry_count, 2);
        assert!(std::fs::read_dir(upload_dir.path()).unwrap().next().is_none());
    }
}
