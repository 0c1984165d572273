//! MANUAL processing strategy (spec §4.10): three explicitly-triggered
//! stages gated behind `/parse`, `/validate`, `/ldap`, each persisting its
//! own checkpoint rather than running straight through like AUTO.
//!
//! Stage 1 parses and stashes the intermediate artifact to disk keyed by
//! `uploadId`; stage 2 rehydrates it and runs validation + DB save with no
//! LDAP writer; stage 3 walks the rows this upload produced that are still
//! `storedInLdap = false` and mirrors them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{PkdError, Result};
use crate::ldif::parser::LdifEntry;
use crate::processing::strategy::{ingest_certificate, ingest_crl, origin_for_dn, ProcessingDeps, ProcessingStrategy, RunningCounts};
use crate::progress::Stage;

/// The host-addressable intermediate an upload is parked in between stage 1
/// and stage 2 (spec §4.10 "serialize the parsed intermediate to a
/// host-addressable temp artifact keyed by uploadId").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ManualArtifact {
    Ldif(Vec<LdifEntry>),
    MasterList(Vec<u8>),
}

/// Drives the three MANUAL stages. Also implements [`ProcessingStrategy`]
/// so it shares the same interface shape as [`crate::processing::AutoStrategy`]
/// per spec §4.10's "two strategies implement a common interface" -- for
/// MANUAL, `process_ldif_entries`/`process_master_list_content` perform
/// stage 1 (parse-and-stash) only; stages 2 and 3 are driven explicitly by
/// [`ManualStrategy::stage_validate`] and [`ManualStrategy::stage_ldap`].
pub struct ManualStrategy {
    artifact_dir: PathBuf,
}

impl ManualStrategy {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    fn artifact_path(&self, upload_id: Uuid) -> PathBuf {
        self.artifact_dir.join(format!("{upload_id}.manual.json"))
    }

    /// Stage 1: persist the parsed intermediate and signal `PENDING`.
    pub fn stage_parse(&self, upload_id: Uuid, artifact: &ManualArtifact, deps: &ProcessingDeps) -> Result<()> {
        std::fs::create_dir_all(&self.artifact_dir)?;
        let json = serde_json::to_vec(artifact)?;
        std::fs::write(self.artifact_path(upload_id), json)?;

        let event = crate::progress::ProgressEvent::new(upload_id, Stage::ParsingCompleted, 100, chrono::Utc::now());
        deps.progress.send_progress(event);
        Ok(())
    }

    fn load_artifact(&self, upload_id: Uuid) -> Result<ManualArtifact> {
        let path = self.artifact_path(upload_id);
        let bytes = std::fs::read(&path).map_err(|e| {
            PkdError::Unexpected(format!("no parsed artifact for upload {upload_id} at {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Confirms stage 1's artifact exists, for a `/parse` call arriving
    /// after autostart already ran it (spec §4.10 "re-triggering is a
    /// no-op").
    pub fn load_artifact_exists(&self, upload_id: Uuid) -> Result<()> {
        if self.artifact_path(upload_id).exists() {
            Ok(())
        } else {
            Err(PkdError::NotFound(format!("no parsed artifact staged for upload {upload_id}")))
        }
    }

    fn remove_artifact(&self, upload_id: Uuid) {
        let _ = std::fs::remove_file(self.artifact_path(upload_id));
    }

    /// Stage 2: rehydrate the stashed artifact, classify + validate + save
    /// to DB only -- `deps` must carry `ldap_writer: None` for this stage
    /// regardless of what the caller's real pool offers, since LDAP mirroring
    /// is deferred to stage 3.
    pub async fn stage_validate(&self, upload_id: Uuid, deps: &ProcessingDeps) -> Result<RunningCounts> {
        let artifact = self.load_artifact(upload_id)?;
        let db_only = without_ldap(deps);

        let counts = match artifact {
            ManualArtifact::Ldif(entries) => self.process_entries_without_ldap(upload_id, entries, &db_only).await?,
            ManualArtifact::MasterList(bytes) => {
                let mut counts = RunningCounts::default();
                crate::processing::strategy::ingest_master_list(upload_id, &bytes, &db_only, &mut counts).await?;
                counts
            }
        };

        let event = crate::progress::ProgressEvent::new(upload_id, Stage::DbSavingCompleted, 100, chrono::Utc::now())
            .with_counts(counts.processed as u64, counts.total.max(1) as u64);
        deps.progress.send_progress(event);
        Ok(counts)
    }

    async fn process_entries_without_ldap(&self, upload_id: Uuid, entries: Vec<LdifEntry>, deps: &ProcessingDeps) -> Result<RunningCounts> {
        let total = entries.len() as u32;
        let mut counts = RunningCounts::default();
        counts.total = total;

        for (idx, entry) in entries.into_iter().enumerate() {
            if entry.has_attribute("userCertificate;binary") || entry.has_attribute("cACertificate;binary") {
                let der = entry
                    .first("userCertificate")
                    .or_else(|| entry.first("cACertificate"))
                    .map(|v| v.as_bytes())
                    .unwrap_or_default();
                let origin = origin_for_dn(&entry.dn);
                if let Err(e) = ingest_certificate(upload_id, &der, origin, deps, &mut counts).await {
                    tracing::warn!(error = %e, dn = %entry.dn, "failed to validate/save LDIF certificate entry");
                }
            } else if entry.has_attribute("certificateRevocationList;binary") {
                let der = entry.first("certificateRevocationList").map(|v| v.as_bytes()).unwrap_or_default();
                if let Err(e) = ingest_crl(upload_id, &der, deps).await {
                    tracing::warn!(error = %e, dn = %entry.dn, "failed to save LDIF CRL entry");
                }
            }
            counts.processed = idx as u32 + 1;
        }
        Ok(counts)
    }

    /// Stage 3: mirror every certificate/CRL/Master-List row this upload
    /// produced that is still `storedInLdap = false`, then drop the
    /// stashed artifact -- the upload is terminal after this point.
    pub async fn stage_ldap(&self, upload_id: Uuid, deps: &ProcessingDeps) -> Result<u32> {
        let writer = deps
            .ldap_writer
            .as_ref()
            .ok_or_else(|| PkdError::LdapConnectionFailed("MANUAL stage 3 requires an LDAP write handle".to_string()))?;

        let certificates = deps
            .certificate_repo
            .search(&crate::db::repo::CertificateFilter::default())
            .await?
            .into_iter()
            .filter(|c| c.upload_id == upload_id && !c.stored_in_ldap);

        let mut written = 0u32;
        for cert in certificates {
            let is_link = cert.certificate_type == crate::model::CertificateType::Csca
                && !cert.subject_dn.eq_ignore_ascii_case(&cert.issuer_dn);
            match writer.write_certificate(&cert, deps.dn_scheme, is_link).await {
                Ok(entry) => {
                    deps.certificate_repo.update_certificate_ldap_status(cert.id, &entry.dn).await?;
                    written += 1;
                }
                Err(e) => tracing::warn!(error = %e, certificate_id = %cert.id, "MANUAL stage 3 LDAP mirror failed"),
            }
        }

        let event = crate::progress::ProgressEvent::new(upload_id, Stage::Completed, 100, chrono::Utc::now())
            .with_counts(written as u64, written.max(1) as u64);
        deps.progress.send_progress(event);
        self.remove_artifact(upload_id);
        Ok(written)
    }

    /// `DELETE /api/upload/{id}` cleanup for a failed MANUAL upload (spec
    /// §4.10): drop whatever stashed artifact exists, idempotently.
    pub fn cleanup(&self, upload_id: Uuid) {
        self.remove_artifact(upload_id);
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }
}

fn without_ldap(deps: &ProcessingDeps) -> ProcessingDeps {
    ProcessingDeps {
        certificate_repo: deps.certificate_repo.clone(),
        crl_repo: deps.crl_repo.clone(),
        masterlist_repo: deps.masterlist_repo.clone(),
        validation_repo: deps.validation_repo.clone(),
        ldap_writer: None,
        progress: deps.progress.clone(),
        trust_anchor_der: deps.trust_anchor_der.clone(),
        cms_verify_policy: deps.cms_verify_policy,
        dn_scheme: deps.dn_scheme,
    }
}

#[async_trait]
impl ProcessingStrategy for ManualStrategy {
    async fn process_ldif_entries(&self, upload_id: Uuid, entries: Vec<LdifEntry>, deps: &ProcessingDeps) -> Result<RunningCounts> {
        self.stage_parse(upload_id, &ManualArtifact::Ldif(entries), deps)?;
        Ok(RunningCounts::default())
    }

    async fn process_master_list_content(&self, upload_id: Uuid, bytes: &[u8], deps: &ProcessingDeps) -> Result<RunningCounts> {
        self.stage_parse(upload_id, &ManualArtifact::MasterList(bytes.to_vec()), deps)?;
        Ok(RunningCounts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::strategy::test_support::deps_without_ldap;
    use tempfile::tempdir;

    #[test]
    fn stage_parse_writes_an_artifact_file_and_emits_parsing_completed() {
        let dir = tempdir().unwrap();
        let strategy = ManualStrategy::new(dir.path());
        let deps = deps_without_ldap();
        let upload_id = Uuid::new_v4();

        strategy.stage_parse(upload_id, &ManualArtifact::Ldif(vec![LdifEntry::default()]), &deps).unwrap();
        assert!(strategy.artifact_path(upload_id).exists());

        let loaded = strategy.load_artifact(upload_id).unwrap();
        assert!(matches!(loaded, ManualArtifact::Ldif(entries) if entries.len() == 1));
    }

    #[test]
    fn cleanup_removes_the_stashed_artifact() {
        let dir = tempdir().unwrap();
        let strategy = ManualStrategy::new(dir.path());
        let deps = deps_without_ldap();
        let upload_id = Uuid::new_v4();

        strategy.stage_parse(upload_id, &ManualArtifact::MasterList(vec![0x30, 0x00]), &deps).unwrap();
        strategy.cleanup(upload_id);
        assert!(!strategy.artifact_path(upload_id).exists());
    }
}
