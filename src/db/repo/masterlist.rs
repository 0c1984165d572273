//! Master List repository (spec §4.4 `MasterListRepository`).

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::Result;
use crate::model::MasterListRecord;

#[async_trait]
pub trait MasterListRepository: Send + Sync {
    /// Unique on `fingerprintSha256` (spec §3); a duplicate insert is a
    /// no-op and returns the existing id.
    async fn save(&self, record: &MasterListRecord) -> Result<Uuid>;
    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> Result<()>;
    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<MasterListRecord>>;
}

pub struct PgMasterListRepository {
    executor: Arc<dyn Executor>,
}

impl PgMasterListRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_record(row: &Row) -> Result<MasterListRecord> {
        Ok(MasterListRecord {
            id: row.try_get("id")?,
            upload_id: row.try_get("upload_id")?,
            signer_country: row.try_get("signer_country")?,
            signer_dn: row.try_get("signer_dn")?,
            version: row.try_get("version")?,
            csca_certificate_count: row.try_get::<i32>("csca_certificate_count")? as u32,
            fingerprint_sha256: row.try_get("fingerprint_sha256")?,
            ml_binary: row.try_get("ml_binary")?,
            ldap_dn: row.try_get("ldap_dn")?,
            stored_in_ldap: row.try_get("stored_in_ldap")?,
        })
    }
}

#[async_trait]
impl MasterListRepository for PgMasterListRepository {
    async fn save(&self, record: &MasterListRecord) -> Result<Uuid> {
        let rows = self
            .executor
            .execute_query(
                "INSERT INTO master_lists (id, upload_id, signer_country, signer_dn, version, \
                 csca_certificate_count, fingerprint_sha256, ml_binary) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (fingerprint_sha256) DO NOTHING \
                 RETURNING id",
                &[
                    QueryParam::Uuid(record.id),
                    QueryParam::Uuid(record.upload_id),
                    QueryParam::Text(record.signer_country.clone()),
                    QueryParam::Text(record.signer_dn.clone()),
                    record.version.map(|v| QueryParam::Int(v as i64)).unwrap_or(QueryParam::Null),
                    QueryParam::Int(record.csca_certificate_count as i64),
                    QueryParam::Text(record.fingerprint_sha256.clone()),
                    QueryParam::Bytes(record.ml_binary.clone()),
                ],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(row.try_get("id")?),
            None => {
                let existing = self
                    .executor
                    .execute_query(
                        "SELECT id FROM master_lists WHERE fingerprint_sha256 = $1",
                        &[QueryParam::Text(record.fingerprint_sha256.clone())],
                    )
                    .await?;
                Ok(existing
                    .first()
                    .map(|r| r.try_get::<Uuid>("id"))
                    .transpose()?
                    .unwrap_or(record.id))
            }
        }
    }

    async fn update_ldap_status(&self, id: Uuid, dn: &str) -> Result<()> {
        self.executor
            .execute_command(
                "UPDATE master_lists SET ldap_dn = $1, stored_in_ldap = true WHERE id = $2",
                &[QueryParam::Text(dn.to_string()), QueryParam::Uuid(id)],
            )
            .await?;
        Ok(())
    }

    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<MasterListRecord>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM master_lists WHERE upload_id = $1",
                &[QueryParam::Uuid(upload_id)],
            )
            .await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
