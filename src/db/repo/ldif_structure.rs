//! LDIF structure repository (spec §4.4 `LdifStructureRepository`).
//!
//! Records, per uploaded LDIF entry, the DN and the set of attribute names
//! it carried -- not the certificate payload itself -- so
//! `GET /api/upload/{id}/ldif-structure` can render a tree view without
//! re-parsing the original file.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::Result;
use crate::model::LdifStructureEntry;

#[async_trait]
pub trait LdifStructureRepository: Send + Sync {
    async fn save_entries(&self, entries: &[LdifStructureEntry]) -> Result<()>;
    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<LdifStructureEntry>>;
}

pub struct PgLdifStructureRepository {
    executor: Arc<dyn Executor>,
}

impl PgLdifStructureRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_entry(row: &Row) -> Result<LdifStructureEntry> {
        Ok(LdifStructureEntry {
            upload_id: row.try_get("upload_id")?,
            dn: row.try_get("dn")?,
            attribute_names: row
                .try_get::<String>("attribute_names")?
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

#[async_trait]
impl LdifStructureRepository for PgLdifStructureRepository {
    async fn save_entries(&self, entries: &[LdifStructureEntry]) -> Result<()> {
        for entry in entries {
            self.executor
                .execute_command(
                    "INSERT INTO ldif_structures (upload_id, dn, attribute_names) VALUES ($1, $2, $3)",
                    &[
                        QueryParam::Uuid(entry.upload_id),
                        QueryParam::Text(entry.dn.clone()),
                        QueryParam::Text(entry.attribute_names.join(",")),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn find_by_upload_id(&self, upload_id: Uuid) -> Result<Vec<LdifStructureEntry>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM ldif_structures WHERE upload_id = $1",
                &[QueryParam::Uuid(upload_id)],
            )
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}
