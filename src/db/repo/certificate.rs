//! Certificate repository (spec §4.4 `CertificateRepository`).
//!
//! The `UNIQUE(certificateType, fingerprintSha256)` invariant from spec §3
//! is enforced here with `ON CONFLICT DO NOTHING`, not in application code,
//! so the duplicate check is atomic under concurrent uploads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::Result;
use crate::model::{Certificate, CertificateType, ValidationStatus};

/// A certificate search filter (spec §4.4 `search(filter)`). Every field is
/// optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub country_code: Option<String>,
    pub certificate_type: Option<CertificateType>,
    pub validation_status: Option<ValidationStatus>,
    pub subject_dn_contains: Option<String>,
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Returns `(id, isDuplicate)`. A duplicate is a no-op insert that still
    /// gets counted by the caller (spec §3 invariant).
    async fn save_certificate_with_duplicate_check(&self, cert: &Certificate) -> Result<(Uuid, bool)>;
    async fn update_certificate_ldap_status(&self, id: Uuid, dn: &str) -> Result<()>;
    /// All CSCAs whose subject DN matches `dn` case-insensitively -- the
    /// candidate arena the trust-chain engine disambiguates by signature.
    async fn find_all_cscas_by_subject_dn(&self, dn: &str) -> Result<Vec<Certificate>>;
    async fn search(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>>;
    async fn count_ldap_status_by_upload_id(&self, upload_id: Uuid) -> Result<(u64, u64)>;
    async fn track_certificate_duplicate(&self, upload_id: Uuid, fingerprint: &str) -> Result<()>;
    async fn get_distinct_countries(&self) -> Result<Vec<String>>;
}

pub struct PgCertificateRepository {
    executor: Arc<dyn Executor>,
}

impl PgCertificateRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_certificate(row: &Row) -> Result<Certificate> {
        Ok(Certificate {
            id: row.try_get("id")?,
            upload_id: row.try_get("upload_id")?,
            certificate_type: parse_certificate_type(&row.try_get::<String>("certificate_type")?)?,
            country_code: row.try_get("country_code")?,
            subject_dn: row.try_get("subject_dn")?,
            issuer_dn: row.try_get("issuer_dn")?,
            serial_number: row.try_get("serial_number")?,
            fingerprint_sha256: row.try_get("fingerprint_sha256")?,
            not_before: row.try_get("not_before")?,
            not_after: row.try_get("not_after")?,
            certificate_binary: row.try_get("certificate_binary")?,
            validation_status: parse_validation_status(&row.try_get::<String>("validation_status")?)?,
            validation_message: row.try_get("validation_message")?,
            ldap_dn: row.try_get("ldap_dn")?,
            stored_in_ldap: row.try_get("stored_in_ldap")?,
            stored_at: row.try_get("stored_at")?,
        })
    }
}

#[async_trait]
impl CertificateRepository for PgCertificateRepository {
    async fn save_certificate_with_duplicate_check(&self, cert: &Certificate) -> Result<(Uuid, bool)> {
        let rows = self
            .executor
            .execute_query(
                "INSERT INTO certificates (id, upload_id, certificate_type, country_code, subject_dn, \
                 issuer_dn, serial_number, fingerprint_sha256, not_before, not_after, certificate_binary, \
                 validation_status, validation_message) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 ON CONFLICT (certificate_type, fingerprint_sha256) DO NOTHING \
                 RETURNING id",
                &[
                    QueryParam::Uuid(cert.id),
                    QueryParam::Uuid(cert.upload_id),
                    QueryParam::Text(certificate_type_str(cert.certificate_type).to_string()),
                    QueryParam::Text(cert.country_code.clone()),
                    QueryParam::Text(cert.subject_dn.clone()),
                    QueryParam::Text(cert.issuer_dn.clone()),
                    QueryParam::Text(cert.serial_number.clone()),
                    QueryParam::Text(cert.fingerprint_sha256.clone()),
                    QueryParam::Timestamp(cert.not_before),
                    QueryParam::Timestamp(cert.not_after),
                    QueryParam::Bytes(cert.certificate_binary.clone()),
                    QueryParam::Text(validation_status_str(cert.validation_status).to_string()),
                    QueryParam::OptText(cert.validation_message.clone()),
                ],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok((row.try_get("id")?, false)),
            None => {
                let existing = self
                    .executor
                    .execute_query(
                        "SELECT id FROM certificates WHERE certificate_type = $1 AND fingerprint_sha256 = $2",
                        &[
                            QueryParam::Text(certificate_type_str(cert.certificate_type).to_string()),
                            QueryParam::Text(cert.fingerprint_sha256.clone()),
                        ],
                    )
                    .await?;
                let id = existing
                    .first()
                    .map(|r| r.try_get::<Uuid>("id"))
                    .transpose()?
                    .unwrap_or(cert.id);
                Ok((id, true))
            }
        }
    }

    async fn update_certificate_ldap_status(&self, id: Uuid, dn: &str) -> Result<()> {
        self.executor
            .execute_command(
                "UPDATE certificates SET ldap_dn = $1, stored_in_ldap = true, stored_at = $2 WHERE id = $3",
                &[
                    QueryParam::Text(dn.to_string()),
                    QueryParam::Timestamp(Utc::now()),
                    QueryParam::Uuid(id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_all_cscas_by_subject_dn(&self, dn: &str) -> Result<Vec<Certificate>> {
        let normalized = dn.to_lowercase();
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM certificates WHERE certificate_type = 'CSCA' AND lower(subject_dn) = $1",
                &[QueryParam::Text(normalized)],
            )
            .await?;
        rows.iter().map(Self::row_to_certificate).collect()
    }

    async fn search(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let mut clauses = Vec::new();
        let mut params: Vec<QueryParam> = Vec::new();

        if let Some(cc) = &filter.country_code {
            params.push(QueryParam::Text(cc.clone()));
            clauses.push(format!("country_code = ${}", params.len()));
        }
        if let Some(ct) = filter.certificate_type {
            params.push(QueryParam::Text(certificate_type_str(ct).to_string()));
            clauses.push(format!("certificate_type = ${}", params.len()));
        }
        if let Some(vs) = filter.validation_status {
            params.push(QueryParam::Text(validation_status_str(vs).to_string()));
            clauses.push(format!("validation_status = ${}", params.len()));
        }
        if let Some(needle) = &filter.subject_dn_contains {
            params.push(QueryParam::Text(format!("%{needle}%")));
            clauses.push(format!("subject_dn ILIKE ${}", params.len()));
        }

        let sql = if clauses.is_empty() {
            "SELECT * FROM certificates".to_string()
        } else {
            format!("SELECT * FROM certificates WHERE {}", clauses.join(" AND "))
        };

        let rows = self.executor.execute_query(&sql, &params).await?;
        rows.iter().map(Self::row_to_certificate).collect()
    }

    async fn count_ldap_status_by_upload_id(&self, upload_id: Uuid) -> Result<(u64, u64)> {
        let rows = self
            .executor
            .execute_query(
                "SELECT count(*) AS total, count(*) FILTER (WHERE stored_in_ldap) AS in_ldap \
                 FROM certificates WHERE upload_id = $1",
                &[QueryParam::Uuid(upload_id)],
            )
            .await?;
        match rows.first() {
            Some(row) => Ok((row.try_get::<i64>("total")? as u64, row.try_get::<i64>("in_ldap")? as u64)),
            None => Ok((0, 0)),
        }
    }

    async fn track_certificate_duplicate(&self, upload_id: Uuid, fingerprint: &str) -> Result<()> {
        self.executor
            .execute_command(
                "INSERT INTO certificate_duplicates (upload_id, fingerprint_sha256, detected_at) \
                 VALUES ($1, $2, $3)",
                &[
                    QueryParam::Uuid(upload_id),
                    QueryParam::Text(fingerprint.to_string()),
                    QueryParam::Timestamp(Utc::now()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_distinct_countries(&self) -> Result<Vec<String>> {
        let rows = self
            .executor
            .execute_query("SELECT DISTINCT country_code FROM certificates ORDER BY country_code", &[])
            .await?;
        rows.iter().map(|r| r.try_get("country_code")).collect()
    }
}

pub fn certificate_type_str(t: CertificateType) -> &'static str {
    match t {
        CertificateType::Csca => "CSCA",
        CertificateType::Dsc => "DSC",
        CertificateType::DscNc => "DSC_NC",
        CertificateType::Mlsc => "MLSC",
    }
}

pub fn parse_certificate_type(value: &str) -> Result<CertificateType> {
    match value {
        "CSCA" => Ok(CertificateType::Csca),
        "DSC" => Ok(CertificateType::Dsc),
        "DSC_NC" => Ok(CertificateType::DscNc),
        "MLSC" => Ok(CertificateType::Mlsc),
        other => Err(crate::error::PkdError::Unexpected(format!(
            "unknown certificate type in storage: {other}"
        ))),
    }
}

pub fn validation_status_str(s: ValidationStatus) -> &'static str {
    match s {
        ValidationStatus::Valid => "VALID",
        ValidationStatus::ExpiredValid => "EXPIRED_VALID",
        ValidationStatus::Invalid => "INVALID",
        ValidationStatus::Pending => "PENDING",
        ValidationStatus::Warning => "WARNING",
        ValidationStatus::Error => "ERROR",
    }
}

pub fn parse_validation_status(value: &str) -> Result<ValidationStatus> {
    match value {
        "VALID" => Ok(ValidationStatus::Valid),
        "EXPIRED_VALID" => Ok(ValidationStatus::ExpiredValid),
        "INVALID" => Ok(ValidationStatus::Invalid),
        "PENDING" => Ok(ValidationStatus::Pending),
        "WARNING" => Ok(ValidationStatus::Warning),
        "ERROR" => Ok(ValidationStatus::Error),
        other => Err(crate::error::PkdError::Unexpected(format!(
            "unknown validation status in storage: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_type_round_trips() {
        for ct in [CertificateType::Csca, CertificateType::Dsc, CertificateType::DscNc, CertificateType::Mlsc] {
            assert_eq!(parse_certificate_type(certificate_type_str(ct)).unwrap(), ct);
        }
    }

    #[test]
    fn validation_status_round_trips() {
        for vs in [ValidationStatus::Valid, ValidationStatus::ExpiredValid, ValidationStatus::Invalid] {
            assert_eq!(parse_validation_status(validation_status_str(vs)).unwrap(), vs);
        }
    }
}
