//! Relational connection pool, backed by `deadpool-postgres`.
//!
//! Acquisition is bounded by `acquire_timeout`; a caller that cannot get a
//! connection in that window gets [`PkdError::PoolTimeout`] rather than
//! blocking forever (spec §4.2). Oracle is named in the spec as an
//! alternative backend but no Oracle crate appears anywhere in the example
//! corpus, so `DbPool::new` rejects `DatabaseKind::Oracle` at construction
//! time rather than faking support (see DESIGN.md).

use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::config::{DatabaseConfig, DatabaseKind};
use crate::error::{PkdError, Result};

pub struct DbPool {
    inner: Pool,
    acquire_timeout: std::time::Duration,
}

/// RAII handle to a leased connection. Returned to the pool on drop.
pub struct DbConn {
    inner: deadpool_postgres::Object,
}

impl std::ops::Deref for DbConn {
    type Target = tokio_postgres::Client;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DbPool {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        if config.kind != DatabaseKind::Postgres {
            return Err(PkdError::Configuration(
                "only the postgres backend is implemented".to_string(),
            ));
        }

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(config.password.as_str());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool_config = PoolConfig {
            max_size: config.pool_max,
            ..Default::default()
        };
        let inner = Pool::builder(manager)
            .config(pool_config)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PkdError::DbConnectionFailed(format!("failed to build pool: {e}")))?;

        Ok(Self {
            inner,
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Acquire a connection, bounded by the configured acquire timeout.
    pub async fn acquire(&self) -> Result<DbConn> {
        match tokio::time::timeout(self.acquire_timeout, self.inner.get()).await {
            Ok(Ok(conn)) => Ok(DbConn { inner: conn }),
            Ok(Err(e)) => Err(PkdError::DbConnectionFailed(format!(
                "failed to acquire connection: {e}"
            ))),
            Err(_) => Err(PkdError::PoolTimeout(self.acquire_timeout)),
        }
    }
}
