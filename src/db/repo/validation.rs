//! Validation result repository (spec §4.4 `ValidationRepository`).
//!
//! One row per `(uploadId, fingerprint)` (spec §3 invariant); re-validation
//! (`POST /api/validation/revalidate`) overwrites by that key rather than
//! inserting a second row.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::db::repo::certificate::{certificate_type_str, parse_certificate_type, parse_validation_status, validation_status_str};
use crate::error::Result;
use crate::model::ValidationResult;

/// Read-only lookup used by the PA-lookup data path (SPEC_FULL.md §B.4):
/// either a subject DN or a fingerprint, whichever the caller has on hand.
#[derive(Debug, Clone)]
pub enum PaLookupQuery {
    SubjectDn(String),
    Fingerprint(String),
}

#[async_trait]
pub trait ValidationRepository: Send + Sync {
    /// Upsert by `(uploadId, fingerprint)`.
    async fn save(&self, result: &ValidationResult) -> Result<()>;
    /// Count of validation results per `errorCode`/`validationStatus`, for
    /// the statistics dashboard.
    async fn get_reason_breakdown(&self) -> Result<Vec<(String, u64)>>;
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<ValidationResult>>;
    async fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Vec<ValidationResult>>;
    /// `/api/certificates/pa-lookup` (SPEC_FULL.md §B.4): a single
    /// lightweight lookup dispatching on whichever key the caller supplied.
    async fn pa_lookup(&self, query: &PaLookupQuery) -> Result<Vec<ValidationResult>> {
        match query {
            PaLookupQuery::SubjectDn(dn) => self.find_by_subject_dn(dn).await,
            PaLookupQuery::Fingerprint(fp) => Ok(self.find_by_fingerprint(fp).await?.into_iter().collect()),
        }
    }
}

pub struct PgValidationRepository {
    executor: Arc<dyn Executor>,
}

impl PgValidationRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_result(row: &Row) -> Result<ValidationResult> {
        Ok(ValidationResult {
            certificate_id: row.try_get("certificate_id")?,
            upload_id: row.try_get("upload_id")?,
            fingerprint: row.try_get("fingerprint")?,
            subject_dn: row.try_get("subject_dn")?,
            issuer_dn: row.try_get("issuer_dn")?,
            serial_number: row.try_get("serial_number")?,
            certificate_type: parse_certificate_type(&row.try_get::<String>("certificate_type")?)?,
            country_code: row.try_get("country_code")?,
            trust_chain_valid: row.try_get("trust_chain_valid")?,
            trust_chain_message: row.try_get("trust_chain_message")?,
            trust_chain_path: row.try_get("trust_chain_path")?,
            csca_found: row.try_get("csca_found")?,
            csca_subject_dn: row.try_get("csca_subject_dn")?,
            signature_verified: row.try_get("signature_verified")?,
            signature_algorithm: row.try_get("signature_algorithm")?,
            validity_check_passed: row.try_get("validity_check_passed")?,
            is_expired: row.try_get("is_expired")?,
            is_not_yet_valid: row.try_get("is_not_yet_valid")?,
            not_before: row.try_get("not_before")?,
            not_after: row.try_get("not_after")?,
            is_ca: row.try_get("is_ca")?,
            is_self_signed: row.try_get("is_self_signed")?,
            path_length_constraint: row
                .try_get::<Option<i32>>("path_length_constraint")?
                .map(|v| v as u32),
            key_usage_valid: row.try_get("key_usage_valid")?,
            key_usage_flags: row
                .try_get::<String>("key_usage_flags")?
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            crl_check_status: row.try_get("crl_check_status")?,
            crl_check_message: row.try_get("crl_check_message")?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            validation_duration_ms: row.try_get::<i64>("validation_duration_ms")? as u64,
            validation_status: parse_validation_status(&row.try_get::<String>("validation_status")?)?,
        })
    }
}

#[async_trait]
impl ValidationRepository for PgValidationRepository {
    async fn save(&self, result: &ValidationResult) -> Result<()> {
        self.executor
            .execute_command(
                "INSERT INTO validation_results (certificate_id, upload_id, fingerprint, subject_dn, \
                 issuer_dn, serial_number, certificate_type, country_code, trust_chain_valid, \
                 trust_chain_message, trust_chain_path, csca_found, csca_subject_dn, signature_verified, \
                 signature_algorithm, validity_check_passed, is_expired, is_not_yet_valid, not_before, \
                 not_after, is_ca, is_self_signed, path_length_constraint, key_usage_valid, \
                 key_usage_flags, crl_check_status, crl_check_message, error_code, error_message, \
                 validation_duration_ms, validation_status) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,\
                 $23,$24,$25,$26,$27,$28,$29,$30,$31) \
                 ON CONFLICT (upload_id, fingerprint) DO UPDATE SET \
                 trust_chain_valid = EXCLUDED.trust_chain_valid, \
                 trust_chain_message = EXCLUDED.trust_chain_message, \
                 trust_chain_path = EXCLUDED.trust_chain_path, \
                 csca_found = EXCLUDED.csca_found, \
                 csca_subject_dn = EXCLUDED.csca_subject_dn, \
                 signature_verified = EXCLUDED.signature_verified, \
                 validity_check_passed = EXCLUDED.validity_check_passed, \
                 is_expired = EXCLUDED.is_expired, \
                 is_not_yet_valid = EXCLUDED.is_not_yet_valid, \
                 error_code = EXCLUDED.error_code, \
                 error_message = EXCLUDED.error_message, \
                 validation_status = EXCLUDED.validation_status",
                &[
                    QueryParam::Uuid(result.certificate_id),
                    QueryParam::Uuid(result.upload_id),
                    QueryParam::Text(result.fingerprint.clone()),
                    QueryParam::Text(result.subject_dn.clone()),
                    QueryParam::Text(result.issuer_dn.clone()),
                    QueryParam::Text(result.serial_number.clone()),
                    QueryParam::Text(certificate_type_str(result.certificate_type).to_string()),
                    QueryParam::Text(result.country_code.clone()),
                    QueryParam::Bool(result.trust_chain_valid),
                    QueryParam::Text(result.trust_chain_message.clone()),
                    QueryParam::Text(result.trust_chain_path.clone()),
                    QueryParam::Bool(result.csca_found),
                    QueryParam::OptText(result.csca_subject_dn.clone()),
                    QueryParam::Bool(result.signature_verified),
                    QueryParam::Text(result.signature_algorithm.clone()),
                    QueryParam::Bool(result.validity_check_passed),
                    QueryParam::Bool(result.is_expired),
                    QueryParam::Bool(result.is_not_yet_valid),
                    QueryParam::Timestamp(result.not_before),
                    QueryParam::Timestamp(result.not_after),
                    QueryParam::Bool(result.is_ca),
                    QueryParam::Bool(result.is_self_signed),
                    result
                        .path_length_constraint
                        .map(|v| QueryParam::Int(v as i64))
                        .unwrap_or(QueryParam::Null),
                    QueryParam::Bool(result.key_usage_valid),
                    QueryParam::Text(result.key_usage_flags.join(",")),
                    QueryParam::OptText(result.crl_check_status.clone()),
                    QueryParam::OptText(result.crl_check_message.clone()),
                    QueryParam::OptText(result.error_code.clone()),
                    QueryParam::OptText(result.error_message.clone()),
                    QueryParam::Int(result.validation_duration_ms as i64),
                    QueryParam::Text(validation_status_str(result.validation_status).to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_reason_breakdown(&self) -> Result<Vec<(String, u64)>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT coalesce(error_code, validation_status) AS reason, count(*) AS n \
                 FROM validation_results GROUP BY reason ORDER BY n DESC",
                &[],
            )
            .await?;
        rows.iter()
            .map(|r| Ok((r.try_get::<String>("reason")?, r.try_get::<i64>("n")? as u64)))
            .collect()
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<ValidationResult>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM validation_results WHERE fingerprint = $1 ORDER BY upload_id DESC LIMIT 1",
                &[QueryParam::Text(fingerprint.to_string())],
            )
            .await?;
        rows.first().map(Self::row_to_result).transpose()
    }

    async fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Vec<ValidationResult>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM validation_results WHERE lower(subject_dn) = lower($1)",
                &[QueryParam::Text(subject_dn.to_string())],
            )
            .await?;
        rows.iter().map(Self::row_to_result).collect()
    }
}
