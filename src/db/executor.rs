//! DB-agnostic query facade above the connection pool (spec §4.3, C3).
//!
//! Repositories never touch `tokio_postgres::Client` directly; they go
//! through [`Executor`], which hides dialect differences (currently only
//! Postgres is implemented -- see [`crate::pool::db`]) and forces binary
//! parameters through a bound-parameter path rather than inline encoding
//! (SPEC_FULL.md §D.2).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::error::{PkdError, Result};
use crate::pool::db::DbPool;

/// A bound query parameter. `Bytes` is the only variant that matters for
/// SPEC_FULL.md §D.2: certificate/CRL/Master-List DER must always travel
/// through here, never through a caller-built SQL literal.
#[derive(Debug, Clone)]
pub enum QueryParam {
    Text(String),
    Int(i64),
    UInt(i64),
    Bool(bool),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    OptTimestamp(Option<DateTime<Utc>>),
    OptText(Option<String>),
    Null,
}

impl QueryParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            QueryParam::Text(v) => v,
            QueryParam::Int(v) => v,
            QueryParam::UInt(v) => v,
            QueryParam::Bool(v) => v,
            QueryParam::Uuid(v) => v,
            QueryParam::Bytes(v) => v,
            QueryParam::Timestamp(v) => v,
            QueryParam::OptTimestamp(v) => v,
            QueryParam::OptText(v) => v,
            QueryParam::Null => &NULL_MARKER,
        }
    }
}

const NULL_MARKER: Option<&'static str> = None;

/// Thin wrapper over `tokio_postgres::Row` so repositories stay decoupled
/// from the underlying driver type.
pub struct Row(tokio_postgres::Row);

impl Row {
    pub fn get<'a, T>(&'a self, column: &str) -> T
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        self.0.get(column)
    }

    pub fn try_get<'a, T>(&'a self, column: &str) -> Result<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        self.0
            .try_get(column)
            .map_err(|e| PkdError::DbSaveFailed(format!("column {column} decode failed: {e}")))
    }
}

/// DB-agnostic query/command facade. The only implementation shipped here
/// targets Postgres; an Oracle backend would implement the same trait
/// without repositories changing a line (spec §4.3).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute_query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>>;
    async fn execute_command(&self, sql: &str, params: &[QueryParam]) -> Result<u64>;

    /// `"postgres"` | `"oracle"`, so callers can branch on bytea/BLOB binding
    /// quirks without the executor leaking driver types (spec §4.3).
    fn dialect(&self) -> &'static str;
}

pub struct PgExecutor {
    pool: std::sync::Arc<DbPool>,
}

impl PgExecutor {
    pub fn new(pool: std::sync::Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn execute_query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>> {
        let conn = self.pool.acquire().await?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(QueryParam::as_sql).collect();
        let rows = conn
            .query(sql, &bound)
            .await
            .map_err(|e| PkdError::DbSaveFailed(format!("query failed: {e}")))?;
        Ok(rows.into_iter().map(Row).collect())
    }

    async fn execute_command(&self, sql: &str, params: &[QueryParam]) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(QueryParam::as_sql).collect();
        conn.execute(sql, &bound)
            .await
            .map_err(|e| PkdError::DbSaveFailed(format!("command failed: {e}")))
    }

    fn dialect(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_variants_are_constructible() {
        let params = vec![
            QueryParam::Text("CN=CSCA".to_string()),
            QueryParam::Bytes(vec![0x30, 0x82]),
            QueryParam::Uuid(Uuid::new_v4()),
            QueryParam::Null,
        ];
        assert_eq!(params.len(), 4);
    }
}
