//! Process configuration, loaded once at startup from the environment.
//!
//! Mirrors the shape of spec §6 ("Configuration (environment)"). Startup
//! refuses to proceed if a required secret is missing: `Config::from_env`
//! returns an error rather than substituting a default password.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PkdError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ldap: LdapConfig,
    pub trust_anchor_pem_path: Option<String>,
    pub cms_verify_policy: CmsVerifyPolicy,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub upload_dir: String,
}

/// Whether a CMS signature verification failure aborts ingestion (`Strict`)
/// or is logged and ingestion continues (`Permissive`, the spec's documented
/// current behavior -- see SPEC_FULL.md §D.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmsVerifyPolicy {
    Strict,
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub pool_min: usize,
    pub pool_max: usize,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseKind {
    Postgres,
    Oracle,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Oracle => "oracle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Ordered `host:port` entries the read pool round-robins over.
    pub read_hosts: Vec<String>,
    pub write_host: String,
    pub write_port: u16,
    pub bind_dn: String,
    #[serde(skip_serializing)]
    pub bind_password: String,
    pub base_dn: String,
    pub data_container: String,
    pub nc_data_container: String,
    pub pool_min: usize,
    pub pool_max: usize,
    pub acquire_timeout: Duration,
    pub bind_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub worker_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_enabled: bool,
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    /// Regex patterns matched against request paths that bypass the bearer
    /// token check (health probes, login, static assets).
    pub public_path_patterns: Vec<String>,
}

impl Config {
    /// Load configuration from the process environment. Fails closed: any
    /// required secret (DB password, LDAP bind password, and the JWT secret
    /// when auth is enabled) that is unset aborts startup.
    pub fn from_env() -> Result<Self, PkdError> {
        let db_password = require_env("PKD_DB_PASSWORD")?;
        let ldap_password = require_env("PKD_LDAP_BIND_PASSWORD")?;

        let jwt_enabled = env_bool("PKD_JWT_ENABLED", true);
        let jwt_secret = if jwt_enabled {
            Some(require_env("PKD_JWT_SECRET")?)
        } else {
            std::env::var("PKD_JWT_SECRET").ok()
        };

        let read_hosts: Vec<String> = std::env::var("PKD_LDAP_READ_HOSTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Config {
            database: DatabaseConfig {
                kind: match std::env::var("PKD_DB_KIND").as_deref() {
                    Ok("oracle") => DatabaseKind::Oracle,
                    _ => DatabaseKind::Postgres,
                },
                host: env_or("PKD_DB_HOST", "localhost"),
                port: env_u16("PKD_DB_PORT", 5432),
                database: env_or("PKD_DB_NAME", "pkd"),
                user: env_or("PKD_DB_USER", "pkd"),
                password: db_password,
                pool_min: env_usize("PKD_DB_POOL_MIN", 1),
                pool_max: env_usize("PKD_DB_POOL_MAX", 10),
                acquire_timeout: Duration::from_secs(env_u64("PKD_DB_ACQUIRE_TIMEOUT_SEC", 5)),
            },
            ldap: LdapConfig {
                read_hosts: if read_hosts.is_empty() {
                    vec!["localhost:389".to_string()]
                } else {
                    read_hosts
                },
                write_host: env_or("PKD_LDAP_WRITE_HOST", "localhost"),
                write_port: env_u16("PKD_LDAP_WRITE_PORT", 389),
                bind_dn: env_or("PKD_LDAP_BIND_DN", "cn=admin,dc=pkd"),
                bind_password: ldap_password,
                base_dn: env_or("PKD_LDAP_BASE_DN", "dc=pkd"),
                data_container: env_or("PKD_LDAP_DATA_CONTAINER", "data"),
                nc_data_container: env_or("PKD_LDAP_NC_DATA_CONTAINER", "nc-data"),
                pool_min: env_usize("PKD_LDAP_POOL_MIN", 1),
                pool_max: env_usize("PKD_LDAP_POOL_MAX", 10),
                acquire_timeout: Duration::from_secs(env_u64("PKD_LDAP_ACQUIRE_TIMEOUT_SEC", 5)),
                bind_timeout: Duration::from_secs(env_u64("PKD_LDAP_BIND_TIMEOUT_SEC", 3)),
            },
            trust_anchor_pem_path: std::env::var("PKD_TRUST_ANCHOR_PEM").ok(),
            cms_verify_policy: match std::env::var("PKD_CMS_VERIFY_POLICY").as_deref() {
                Ok("strict") => CmsVerifyPolicy::Strict,
                _ => CmsVerifyPolicy::Permissive,
            },
            server: ServerConfig {
                port: env_u16("PKD_SERVER_PORT", 8080),
                worker_count: env_usize("PKD_SERVER_WORKERS", num_cpus_fallback()),
            },
            auth: AuthConfig {
                jwt_enabled,
                jwt_secret,
                public_path_patterns: vec![
                    "^/api/health".to_string(),
                    "^/api/auth/login$".to_string(),
                ],
            },
            upload_dir: env_or("PKD_UPLOAD_DIR", "/app/uploads"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PkdError> {
        if self.database.password.is_empty() {
            return Err(PkdError::Configuration("database password must not be empty".into()));
        }
        if self.ldap.bind_password.is_empty() {
            return Err(PkdError::Configuration("LDAP bind password must not be empty".into()));
        }
        if self.auth.jwt_enabled && self.auth.jwt_secret.as_deref().unwrap_or("").is_empty() {
            return Err(PkdError::Configuration(
                "JWT secret must be set when authentication is enabled".into(),
            ));
        }
        if self.ldap.read_hosts.is_empty() {
            return Err(PkdError::Configuration("at least one LDAP read host is required".into()));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String, PkdError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PkdError::Configuration(format!("required environment variable {key} is not set")))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "PKD_DB_PASSWORD",
            "PKD_LDAP_BIND_PASSWORD",
            "PKD_JWT_ENABLED",
            "PKD_JWT_SECRET",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn from_env_fails_without_db_password() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("PKD_LDAP_BIND_PASSWORD", "x");
        let result = Config::from_env();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn from_env_fails_when_jwt_enabled_without_secret() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("PKD_DB_PASSWORD", "x");
        std::env::set_var("PKD_LDAP_BIND_PASSWORD", "x");
        std::env::set_var("PKD_JWT_ENABLED", "true");
        let result = Config::from_env();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn from_env_succeeds_with_required_secrets() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("PKD_DB_PASSWORD", "x");
        std::env::set_var("PKD_LDAP_BIND_PASSWORD", "x");
        std::env::set_var("PKD_JWT_ENABLED", "false");
        let config = Config::from_env().unwrap();
        assert_eq!(config.database.kind, DatabaseKind::Postgres);
        clear_env();
    }
}
