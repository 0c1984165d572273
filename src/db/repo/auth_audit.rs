//! Authentication and operation audit repository (spec §4.4, §4.13 C13).
//!
//! `AuthAudit` rows are append-only: the repository exposes no update or
//! delete, only `insert` and the read queries a compliance view needs.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam, Row};
use crate::error::{PkdError, Result};
use crate::model::{AuthAudit, OperationType};

#[async_trait]
pub trait AuthAuditRepository: Send + Sync {
    async fn insert(&self, entry: &AuthAudit) -> Result<Uuid>;
    async fn find_by_resource_id(&self, resource_id: &str) -> Result<Vec<AuthAudit>>;
    async fn find_recent(&self, limit: u32) -> Result<Vec<AuthAudit>>;
}

pub struct PgAuthAuditRepository {
    executor: Arc<dyn Executor>,
}

impl PgAuthAuditRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_entry(row: &Row) -> Result<AuthAudit> {
        Ok(AuthAudit {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            operation_type: parse_operation_type(&row.try_get::<String>("operation_type")?)?,
            subtype: row.try_get("subtype")?,
            resource_id: row.try_get("resource_id")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            method: row.try_get("method")?,
            path: row.try_get("path")?,
            success: row.try_get("success")?,
            error_message: row.try_get("error_message")?,
            metadata: serde_json::from_str(&row.try_get::<String>("metadata")?)
                .unwrap_or(serde_json::Value::Null),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl AuthAuditRepository for PgAuthAuditRepository {
    async fn insert(&self, entry: &AuthAudit) -> Result<Uuid> {
        self.executor
            .execute_command(
                "INSERT INTO auth_audit (id, user_id, username, operation_type, subtype, resource_id, \
                 ip, user_agent, method, path, success, error_message, metadata, created_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
                &[
                    QueryParam::Uuid(entry.id),
                    entry.user_id.map(QueryParam::Uuid).unwrap_or(QueryParam::Null),
                    QueryParam::OptText(entry.username.clone()),
                    QueryParam::Text(operation_type_str(entry.operation_type).to_string()),
                    QueryParam::OptText(entry.subtype.clone()),
                    QueryParam::OptText(entry.resource_id.clone()),
                    QueryParam::OptText(entry.ip.clone()),
                    QueryParam::OptText(entry.user_agent.clone()),
                    QueryParam::Text(entry.method.clone()),
                    QueryParam::Text(entry.path.clone()),
                    QueryParam::Bool(entry.success),
                    QueryParam::OptText(entry.error_message.clone()),
                    QueryParam::Text(entry.metadata.to_string()),
                    QueryParam::Timestamp(entry.created_at),
                ],
            )
            .await?;
        Ok(entry.id)
    }

    async fn find_by_resource_id(&self, resource_id: &str) -> Result<Vec<AuthAudit>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM auth_audit WHERE resource_id = $1 ORDER BY created_at DESC",
                &[QueryParam::Text(resource_id.to_string())],
            )
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn find_recent(&self, limit: u32) -> Result<Vec<AuthAudit>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM auth_audit ORDER BY created_at DESC LIMIT $1",
                &[QueryParam::Int(limit as i64)],
            )
            .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}

fn operation_type_str(op: OperationType) -> &'static str {
    match op {
        OperationType::FileUpload => "FILE_UPLOAD",
        OperationType::UploadDelete => "UPLOAD_DELETE",
        OperationType::CertExport => "CERT_EXPORT",
        OperationType::AuthLogin => "AUTH_LOGIN",
        OperationType::AuthLogout => "AUTH_LOGOUT",
        OperationType::Validate => "VALIDATE",
    }
}

fn parse_operation_type(value: &str) -> Result<OperationType> {
    match value {
        "FILE_UPLOAD" => Ok(OperationType::FileUpload),
        "UPLOAD_DELETE" => Ok(OperationType::UploadDelete),
        "CERT_EXPORT" => Ok(OperationType::CertExport),
        "AUTH_LOGIN" => Ok(OperationType::AuthLogin),
        "AUTH_LOGOUT" => Ok(OperationType::AuthLogout),
        "VALIDATE" => Ok(OperationType::Validate),
        other => Err(PkdError::Unexpected(format!("unknown operation type in storage: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_type_round_trips() {
        for op in [
            OperationType::FileUpload,
            OperationType::UploadDelete,
            OperationType::AuthLogin,
        ] {
            assert_eq!(parse_operation_type(operation_type_str(op)).unwrap(), op);
        }
    }
}
