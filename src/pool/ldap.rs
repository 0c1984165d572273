//! LDAP connection pool (spec §4.2).
//!
//! Two disjoint pools: a round-robin *read* pool over `config.read_hosts`
//! (index incremented atomically per acquisition) and a single *write*
//! pool that always targets the declared primary, so concurrent uploads
//! never fan writes out across replicas and risk a multi-master conflict.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ldap3::{LdapConnAsync, LdapConnSettings};
use tokio::sync::Semaphore;

use crate::config::LdapConfig;
use crate::error::{PkdError, Result};

/// One bounded pool of LDAP connections to a single `host:port`. `ldap3`
/// connections are cheap to open and are not internally poolable, so this
/// tracks live connections with a semaphore sized to `pool_max` and opens a
/// fresh connection per acquisition, closing it on release -- matching the
/// "bounded concurrency, no idle reuse" approach `ldap3`'s own examples
/// take for short-lived write sessions.
struct HostPool {
    host: String,
    port: u16,
    semaphore: Arc<Semaphore>,
    bind_dn: String,
    bind_password: String,
    bind_timeout: std::time::Duration,
}

impl HostPool {
    fn new(
        host: String,
        port: u16,
        pool_max: usize,
        bind_dn: String,
        bind_password: String,
        bind_timeout: std::time::Duration,
    ) -> Self {
        Self {
            host,
            port,
            semaphore: Arc::new(Semaphore::new(pool_max.max(1))),
            bind_dn,
            bind_password,
            bind_timeout,
        }
    }

    async fn acquire(&self, acquire_timeout: std::time::Duration) -> Result<LdapHandle> {
        let permit = tokio::time::timeout(acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| PkdError::PoolTimeout(acquire_timeout))?
            .map_err(|_| PkdError::LdapConnectionFailed("pool closed".to_string()))?;

        let url = format!("ldap://{}:{}", self.host, self.port);
        let (conn, mut ldap) = tokio::time::timeout(self.bind_timeout, async {
            LdapConnAsync::with_settings(LdapConnSettings::new(), &url).await
        })
        .await
        .map_err(|_| PkdError::LdapConnectionFailed("connect timed out".to_string()))?
        .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?;

        ldap3::drive!(conn);

        ldap.simple_bind(&self.bind_dn, &self.bind_password)
            .await
            .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?
            .success()
            .map_err(|e| PkdError::LdapConnectionFailed(e.to_string()))?;

        Ok(LdapHandle {
            ldap,
            _permit: permit,
        })
    }
}

/// RAII handle over a bound `ldap3::Ldap` connection. The owned semaphore
/// permit is released when this value drops, freeing a slot in the pool.
pub struct LdapHandle {
    ldap: ldap3::Ldap,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for LdapHandle {
    type Target = ldap3::Ldap;

    fn deref(&self) -> &Self::Target {
        &self.ldap
    }
}

impl std::ops::DerefMut for LdapHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ldap
    }
}

pub struct LdapPool {
    read_pools: Vec<HostPool>,
    next_read: AtomicUsize,
    write_pool: HostPool,
    acquire_timeout: std::time::Duration,
}

impl LdapPool {
    pub fn new(config: &LdapConfig) -> Result<Self> {
        if config.read_hosts.is_empty() {
            return Err(PkdError::Configuration(
                "at least one LDAP read host is required".to_string(),
            ));
        }

        let read_pools = config
            .read_hosts
            .iter()
            .map(|entry| {
                let (host, port) = split_host_port(entry)?;
                Ok(HostPool::new(
                    host,
                    port,
                    config.pool_max,
                    config.bind_dn.clone(),
                    config.bind_password.clone(),
                    config.bind_timeout,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let write_pool = HostPool::new(
            config.write_host.clone(),
            config.write_port,
            config.pool_max,
            config.bind_dn.clone(),
            config.bind_password.clone(),
            config.bind_timeout,
        );

        Ok(Self {
            read_pools,
            next_read: AtomicUsize::new(0),
            write_pool,
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Acquire a read handle, round-robin across configured read hosts.
    pub async fn acquire_read(&self) -> Result<LdapHandle> {
        let idx = self.next_read.fetch_add(1, Ordering::Relaxed) % self.read_pools.len();
        self.read_pools[idx].acquire(self.acquire_timeout).await
    }

    /// Acquire a write handle. Always targets the declared primary.
    pub async fn acquire_write(&self) -> Result<LdapHandle> {
        self.write_pool.acquire(self.acquire_timeout).await
    }
}

fn split_host_port(entry: &str) -> Result<(String, u16)> {
    let (host, port) = entry.rsplit_once(':').ok_or_else(|| {
        PkdError::Configuration(format!("invalid LDAP host entry {entry:?}, expected host:port"))
    })?;
    let port: u16 = port
        .parse()
        .map_err(|_| PkdError::Configuration(format!("invalid LDAP port in {entry:?}")))?;
    Ok((host.to_string(), port))
}
