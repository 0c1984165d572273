//! CRL repository (spec §4.4 `CrlRepository`).

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::db::repo::certificate::{parse_validation_status, validation_status_str};
use crate::error::Result;
use crate::model::{Crl, RevocationReason, RevokedCertificate};

#[async_trait]
pub trait CrlRepository: Send + Sync {
    async fn save(&self, crl: &Crl) -> Result<Uuid>;
    async fn save_revoked_certificate(&self, revoked: &RevokedCertificate) -> Result<()>;
    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> Result<()>;
}

pub struct PgCrlRepository {
    executor: Arc<dyn Executor>,
}

impl PgCrlRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl CrlRepository for PgCrlRepository {
    async fn save(&self, crl: &Crl) -> Result<Uuid> {
        self.executor
            .execute_command(
                "INSERT INTO crls (id, upload_id, country_code, issuer_dn, this_update, next_update, \
                 crl_number, fingerprint_sha256, crl_binary, validation_status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (fingerprint_sha256) DO NOTHING",
                &[
                    QueryParam::Uuid(crl.id),
                    QueryParam::Uuid(crl.upload_id),
                    QueryParam::Text(crl.country_code.clone()),
                    QueryParam::Text(crl.issuer_dn.clone()),
                    QueryParam::Timestamp(crl.this_update),
                    QueryParam::OptTimestamp(crl.next_update),
                    QueryParam::OptText(crl.crl_number.clone()),
                    QueryParam::Text(crl.fingerprint_sha256.clone()),
                    QueryParam::Bytes(crl.crl_binary.clone()),
                    QueryParam::Text(validation_status_str(crl.validation_status).to_string()),
                ],
            )
            .await?;
        Ok(crl.id)
    }

    async fn save_revoked_certificate(&self, revoked: &RevokedCertificate) -> Result<()> {
        self.executor
            .execute_command(
                "INSERT INTO revoked_certificates (id, crl_id, serial_number, revocation_date, revocation_reason) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    QueryParam::Uuid(revoked.id),
                    QueryParam::Uuid(revoked.crl_id),
                    QueryParam::Text(revoked.serial_number.clone()),
                    QueryParam::Timestamp(revoked.revocation_date),
                    QueryParam::Text(revocation_reason_str(revoked.revocation_reason).to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> Result<()> {
        self.executor
            .execute_command(
                "UPDATE crls SET ldap_dn = $1, stored_in_ldap = true WHERE id = $2",
                &[QueryParam::Text(dn.to_string()), QueryParam::Uuid(id)],
            )
            .await?;
        Ok(())
    }
}

#[allow(dead_code)]
fn row_to_crl(row: &Row) -> Result<Crl> {
    Ok(Crl {
        id: row.try_get("id")?,
        upload_id: row.try_get("upload_id")?,
        country_code: row.try_get("country_code")?,
        issuer_dn: row.try_get("issuer_dn")?,
        this_update: row.try_get("this_update")?,
        next_update: row.try_get("next_update")?,
        crl_number: row.try_get("crl_number")?,
        fingerprint_sha256: row.try_get("fingerprint_sha256")?,
        crl_binary: row.try_get("crl_binary")?,
        validation_status: parse_validation_status(&row.try_get::<String>("validation_status")?)?,
        ldap_dn: row.try_get("ldap_dn")?,
        stored_in_ldap: row.try_get("stored_in_ldap")?,
    })
}

pub fn revocation_reason_str(reason: RevocationReason) -> &'static str {
    match reason {
        RevocationReason::Unspecified => "UNSPECIFIED",
        RevocationReason::KeyCompromise => "KEY_COMPROMISE",
        RevocationReason::CaCompromise => "CA_COMPROMISE",
        RevocationReason::AffiliationChanged => "AFFILIATION_CHANGED",
        RevocationReason::Superseded => "SUPERSEDED",
        RevocationReason::CessationOfOperation => "CESSATION_OF_OPERATION",
        RevocationReason::CertificateHold => "CERTIFICATE_HOLD",
        RevocationReason::RemoveFromCrl => "REMOVE_FROM_CRL",
        RevocationReason::PrivilegeWithdrawn => "PRIVILEGE_WITHDRAWN",
        RevocationReason::AaCompromise => "AA_COMPROMISE",
    }
}
