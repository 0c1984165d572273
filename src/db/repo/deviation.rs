//! Deviation list repository (spec §4.4 `DeviationListRepository`,
//! SPEC_FULL.md §B.2): persists the list-level CMS metadata plus the
//! per-defect rows produced by [`crate::deviation::parse_deviation_list`].

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::Result;
use crate::model::{DeviationList, DeviationListDefect};

#[async_trait]
pub trait DeviationListRepository: Send + Sync {
    async fn save(&self, list: &DeviationList) -> Result<Uuid>;
    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<DeviationList>>;
}

pub struct PgDeviationListRepository {
    executor: Arc<dyn Executor>,
}

impl PgDeviationListRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_defect(row: &Row) -> Result<DeviationListDefect> {
        Ok(DeviationListDefect {
            certificate_issuer_dn: row.try_get("certificate_issuer_dn")?,
            certificate_serial_number: row.try_get("certificate_serial_number")?,
            defect_type_oid: row.try_get("defect_type_oid")?,
            defect_category: row.try_get("defect_category")?,
            defect_description: row.try_get("defect_description")?,
        })
    }
}

#[async_trait]
impl DeviationListRepository for PgDeviationListRepository {
    async fn save(&self, list: &DeviationList) -> Result<Uuid> {
        self.executor
            .execute_command(
                "INSERT INTO deviation_lists (id, upload_id, signer_country, signer_dn, fingerprint_sha256) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (fingerprint_sha256) DO NOTHING",
                &[
                    QueryParam::Uuid(list.id),
                    QueryParam::Uuid(list.upload_id),
                    QueryParam::Text(list.signer_country.clone()),
                    QueryParam::Text(list.signer_dn.clone()),
                    QueryParam::Text(list.fingerprint_sha256.clone()),
                ],
            )
            .await?;

        for defect in &list.defects {
            self.executor
                .execute_command(
                    "INSERT INTO deviation_list_defects (deviation_list_id, certificate_issuer_dn, \
                     certificate_serial_number, defect_type_oid, defect_category, defect_description) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        QueryParam::Uuid(list.id),
                        QueryParam::Text(defect.certificate_issuer_dn.clone()),
                        QueryParam::Text(defect.certificate_serial_number.clone()),
                        QueryParam::Text(defect.defect_type_oid.clone()),
                        QueryParam::Text(defect.defect_category.clone()),
                        QueryParam::Text(defect.defect_description.clone()),
                    ],
                )
                .await?;
        }
        Ok(list.id)
    }

    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<DeviationList>> {
        let list_rows = self
            .executor
            .execute_query(
                "SELECT * FROM deviation_lists WHERE upload_id = $1",
                &[QueryParam::Uuid(upload_id)],
            )
            .await?;

        let mut out = Vec::with_capacity(list_rows.len());
        for row in &list_rows {
            let id: Uuid = row.try_get("id")?;
            let defect_rows = self
                .executor
                .execute_query(
                    "SELECT * FROM deviation_list_defects WHERE deviation_list_id = $1",
                    &[QueryParam::Uuid(id)],
                )
                .await?;
            let defects = defect_rows.iter().map(Self::row_to_defect).collect::<Result<Vec<_>>>()?;
            out.push(DeviationList {
                id,
                upload_id: row.try_get("upload_id")?,
                signer_country: row.try_get("signer_country")?,
                signer_dn: row.try_get("signer_dn")?,
                fingerprint_sha256: row.try_get("fingerprint_sha256")?,
                defects,
            });
        }
        Ok(out)
    }
}
