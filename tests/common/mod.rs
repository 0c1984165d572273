//! Shared fixtures for the end-to-end scenario tests (spec §8 S1-S6).
//!
//! Builds real DER certificates with `rcgen` (ECDSA P-256, the library's
//! default algorithm, which `trustchain::sigalg` already recognizes) and an
//! in-memory set of repository/LDAP-writer fakes so a whole upload can run
//! through `processing::strategy::ingest_certificate` without a live
//! Postgres or LDAP server.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use icao_pkd_core::db::repo::{
    CertificateFilter, CertificateRepository, CrlRepository, MasterListRepository, UploadStatisticsDelta,
    UploadRepository, ValidationRepository,
};
use icao_pkd_core::ldap::{DnScheme, LdapDirectoryWriter, WrittenEntry};
use icao_pkd_core::model::{
    Certificate, CertificateType, Crl, MasterListRecord, RevokedCertificate, Upload, UploadStatus, ValidationResult,
};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A generated certificate plus the key pair that signed it, so it can
/// later act as an issuer for a child certificate.
pub struct GeneratedCert {
    pub der: Vec<u8>,
    pub key_pair: KeyPair,
    pub cert: rcgen::Certificate,
}

fn dn(common_name: &str, country: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name.push(DnType::CountryName, country);
    name
}

fn validity_window(not_before_offset_days: i64, not_after_offset_days: i64) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    (now + Duration::days(not_before_offset_days), now + Duration::days(not_after_offset_days))
}

/// Build a self-signed CSCA: subject == issuer, CA=true, keyCertSign set --
/// exactly spec §8 scenario S2's fixture shape.
pub fn self_signed_csca(common_name: &str, country: &str, not_before_days: i64, not_after_days: i64) -> GeneratedCert {
    let key_pair = KeyPair::generate().expect("keypair generation");
    let mut params = CertificateParams::new(vec![]).expect("empty SAN list is always valid");
    params.distinguished_name = dn(common_name, country);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    let (not_before, not_after) = validity_window(not_before_days, not_after_days);
    params.not_before = not_before;
    params.not_after = not_after;

    let cert = params.self_signed(&key_pair).expect("self-signed CSCA generation");
    let der = cert.der().to_vec();
    GeneratedCert { der, key_pair, cert }
}

/// Build a certificate issued by `issuer`. `is_ca` distinguishes a link
/// CSCA (subject != issuer, CA=true) from a leaf DSC.
pub fn issued_by(
    issuer: &GeneratedCert,
    common_name: &str,
    country: &str,
    is_ca: bool,
    not_before_days: i64,
    not_after_days: i64,
) -> GeneratedCert {
    let key_pair = KeyPair::generate().expect("keypair generation");
    let mut params = CertificateParams::new(vec![]).expect("empty SAN list is always valid");
    params.distinguished_name = dn(common_name, country);
    params.is_ca = if is_ca {
        IsCa::Ca(BasicConstraints::Unconstrained)
    } else {
        IsCa::NoCa
    };
    if is_ca {
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    } else {
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    }
    let (not_before, not_after) = validity_window(not_before_days, not_after_days);
    params.not_before = not_before;
    params.not_after = not_after;

    let cert = params
        .signed_by(&key_pair, &issuer.cert, &issuer.key_pair)
        .expect("issuer-signed certificate generation");
    let der = cert.der().to_vec();
    GeneratedCert { der, key_pair, cert }
}

/// In-memory stand-in for every repository `ProcessingDeps` needs, backed
/// by plain `Mutex<Vec<_>>`/`HashMap` storage rather than a SQL connection.
#[derive(Default)]
pub struct MemoryStore {
    pub uploads: Mutex<Vec<Upload>>,
    pub certificates: Mutex<Vec<Certificate>>,
    pub validations: Mutex<Vec<ValidationResult>>,
    pub crls: Mutex<Vec<Crl>>,
    pub revoked: Mutex<Vec<RevokedCertificate>>,
    pub master_lists: Mutex<Vec<MasterListRecord>>,
    pub duplicate_hits: Mutex<u32>,
    pub ldap_writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }
}

#[async_trait]
impl UploadRepository for MemoryStore {
    async fn insert(&self, upload: &Upload) -> icao_pkd_core::Result<Uuid> {
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(upload.id)
    }
    async fn find_by_id(&self, id: Uuid) -> icao_pkd_core::Result<Option<Upload>> {
        Ok(self.uploads.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }
    async fn find_by_file_hash(&self, hash: &str) -> icao_pkd_core::Result<Option<Upload>> {
        Ok(self.uploads.lock().unwrap().iter().find(|u| u.file_hash == hash).cloned())
    }
    async fn update_status(&self, id: Uuid, status: UploadStatus, error_message: Option<&str>) -> icao_pkd_core::Result<()> {
        let mut rows = self.uploads.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.status = status;
            u.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }
    async fn update_statistics(&self, id: Uuid, counts: &UploadStatisticsDelta) -> icao_pkd_core::Result<()> {
        let mut rows = self.uploads.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.csca_count += counts.csca_count;
            u.dsc_count += counts.dsc_count;
            u.dsc_nc_count += counts.dsc_nc_count;
            u.valid_count += counts.valid_count;
            u.invalid_count += counts.invalid_count;
            u.warning_count += counts.warning_count;
        }
        Ok(())
    }
    async fn update_progress(&self, id: Uuid, total: u32, processed: u32) -> icao_pkd_core::Result<()> {
        let mut rows = self.uploads.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.total_entries = total;
            u.processed_entries = processed;
        }
        Ok(())
    }
    async fn get_change_history(&self, _limit: u32) -> icao_pkd_core::Result<Vec<icao_pkd_core::db::repo::upload::UploadHistoryEntry>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn save_certificate_with_duplicate_check(&self, cert: &Certificate) -> icao_pkd_core::Result<(Uuid, bool)> {
        let mut rows = self.certificates.lock().unwrap();
        if let Some(existing) = rows
            .iter()
            .find(|c| c.certificate_type == cert.certificate_type && c.fingerprint_sha256 == cert.fingerprint_sha256)
        {
            return Ok((existing.id, true));
        }
        rows.push(cert.clone());
        Ok((cert.id, false))
    }
    async fn update_certificate_ldap_status(&self, id: Uuid, dn: &str) -> icao_pkd_core::Result<()> {
        let mut rows = self.certificates.lock().unwrap();
        if let Some(c) = rows.iter_mut().find(|c| c.id == id) {
            c.ldap_dn = Some(dn.to_string());
            c.stored_in_ldap = true;
        }
        Ok(())
    }
    async fn find_all_cscas_by_subject_dn(&self, dn: &str) -> icao_pkd_core::Result<Vec<Certificate>> {
        Ok(self
            .certificates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.certificate_type == CertificateType::Csca && c.subject_dn.eq_ignore_ascii_case(dn))
            .cloned()
            .collect())
    }
    async fn search(&self, _filter: &CertificateFilter) -> icao_pkd_core::Result<Vec<Certificate>> {
        Ok(self.certificates.lock().unwrap().clone())
    }
    async fn count_ldap_status_by_upload_id(&self, upload_id: Uuid) -> icao_pkd_core::Result<(u64, u64)> {
        let rows = self.certificates.lock().unwrap();
        let matching: Vec<_> = rows.iter().filter(|c| c.upload_id == upload_id).collect();
        let in_ldap = matching.iter().filter(|c| c.stored_in_ldap).count() as u64;
        Ok((matching.len() as u64, in_ldap))
    }
    async fn track_certificate_duplicate(&self, _upload_id: Uuid, _fingerprint: &str) -> icao_pkd_core::Result<()> {
        *self.duplicate_hits.lock().unwrap() += 1;
        Ok(())
    }
    async fn get_distinct_countries(&self) -> icao_pkd_core::Result<Vec<String>> {
        let rows = self.certificates.lock().unwrap();
        let mut countries: Vec<String> = rows.iter().map(|c| c.country_code.clone()).collect();
        countries.sort();
        countries.dedup();
        Ok(countries)
    }
}

#[async_trait]
impl CrlRepository for MemoryStore {
    async fn save(&self, crl: &Crl) -> icao_pkd_core::Result<Uuid> {
        self.crls.lock().unwrap().push(crl.clone());
        Ok(crl.id)
    }
    async fn save_revoked_certificate(&self, revoked: &RevokedCertificate) -> icao_pkd_core::Result<()> {
        self.revoked.lock().unwrap().push(revoked.clone());
        Ok(())
    }
    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> icao_pkd_core::Result<()> {
        let mut rows = self.crls.lock().unwrap();
        if let Some(c) = rows.iter_mut().find(|c| c.id == id) {
            c.ldap_dn = Some(dn.to_string());
            c.stored_in_ldap = true;
        }
        Ok(())
    }
}

#[async_trait]
impl MasterListRepository for MemoryStore {
    async fn save(&self, record: &MasterListRecord) -> icao_pkd_core::Result<Uuid> {
        self.master_lists.lock().unwrap().push(record.clone());
        Ok(record.id)
    }
    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> icao_pkd_core::Result<()> {
        let mut rows = self.master_lists.lock().unwrap();
        if let Some(r) = rows.iter_mut().find(|r| r.id == id) {
            r.ldap_dn = Some(dn.to_string());
            r.stored_in_ldap = true;
        }
        Ok(())
    }
    async fn find_by_upload_id(&self, upload_id: Uuid) -> icao_pkd_core::Result<Vec<MasterListRecord>> {
        Ok(self.master_lists.lock().unwrap().iter().filter(|r| r.upload_id == upload_id).cloned().collect())
    }
}

#[async_trait]
impl ValidationRepository for MemoryStore {
    async fn save(&self, result: &ValidationResult) -> icao_pkd_core::Result<()> {
        let mut rows = self.validations.lock().unwrap();
        rows.retain(|r| !(r.upload_id == result.upload_id && r.fingerprint == result.fingerprint));
        rows.push(result.clone());
        Ok(())
    }
    async fn get_reason_breakdown(&self) -> icao_pkd_core::Result<Vec<(String, u64)>> {
        Ok(Vec::new())
    }
    async fn find_by_fingerprint(&self, fingerprint: &str) -> icao_pkd_core::Result<Option<ValidationResult>> {
        Ok(self.validations.lock().unwrap().iter().find(|r| r.fingerprint == fingerprint).cloned())
    }
    async fn find_by_subject_dn(&self, subject_dn: &str) -> icao_pkd_core::Result<Vec<ValidationResult>> {
        Ok(self
            .validations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.subject_dn.eq_ignore_ascii_case(subject_dn))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LdapDirectoryWriter for MemoryStore {
    async fn write_certificate(&self, cert: &Certificate, scheme: DnScheme, _is_link: bool) -> icao_pkd_core::Result<WrittenEntry> {
        let dn = match scheme {
            DnScheme::V2 => format!("cn={},o=csca,c={}", cert.fingerprint_sha256, cert.country_code),
            DnScheme::V1 => format!("cn={}+sn={},o=csca,c={}", cert.subject_dn, cert.serial_number, cert.country_code),
        };
        self.ldap_writes.lock().unwrap().push(dn.clone());
        Ok(WrittenEntry { dn })
    }
    async fn write_crl(&self, crl: &Crl, _scheme: DnScheme) -> icao_pkd_core::Result<WrittenEntry> {
        let dn = format!("cn={},o=crl,c={}", crl.fingerprint_sha256, crl.country_code);
        self.ldap_writes.lock().unwrap().push(dn.clone());
        Ok(WrittenEntry { dn })
    }
    async fn write_master_list(&self, ml: &MasterListRecord, _scheme: DnScheme) -> icao_pkd_core::Result<WrittenEntry> {
        let dn = format!("cn={},o=ml,c={}", ml.fingerprint_sha256, ml.signer_country);
        self.ldap_writes.lock().unwrap().push(dn.clone());
        Ok(WrittenEntry { dn })
    }
}

/// Build `ProcessingDeps` wired entirely to one shared `MemoryStore`.
pub fn deps_with_store(store: &std::sync::Arc<MemoryStore>, with_ldap: bool) -> icao_pkd_core::processing::ProcessingDeps {
    icao_pkd_core::processing::ProcessingDeps {
        certificate_repo: store.clone(),
        crl_repo: store.clone(),
        masterlist_repo: store.clone(),
        validation_repo: store.clone(),
        ldap_writer: if with_ldap { Some(store.clone() as std::sync::Arc<dyn LdapDirectoryWriter>) } else { None },
        progress: icao_pkd_core::progress::ProgressManager::new(),
        trust_anchor_der: None,
        cms_verify_policy: icao_pkd_core::config::CmsVerifyPolicy::Permissive,
        dn_scheme: DnScheme::V2,
    }
}

#[allow(dead_code)]
pub fn country_counts(store: &MemoryStore) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for cert in store.certificates.lock().unwrap().iter() {
        *map.entry(cert.country_code.clone()).or_insert(0) += 1;
    }
    map
}
