//! Authentication & audit (spec §4.13, C13).
//!
//! A request filter applied pre-handler: non-public paths require a
//! `Bearer <jwt>`, public paths (health probes, login) bypass the check
//! entirely. The HTTP layer owns extracting headers/paths and calling
//! through to [`AuthGate::authenticate`]; this module owns only the
//! decision and the audit log that follows it.

use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::repo::AuthAuditRepository;
use crate::error::{PkdError, Result};
use crate::model::{AuthAudit, OperationType};

/// Claims carried by the bearer token. `sub` is the subject (user id as a
/// string, to stay agnostic of whether the issuer encodes a UUID or an
/// opaque identifier); `exp` is validated by `jsonwebtoken` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
}

/// Compiled form of [`AuthConfig`]: public-path regexes built once rather
/// than re-compiled per request, and the decoding key derived from the
/// configured secret only when auth is actually enabled.
pub struct AuthGate {
    jwt_enabled: bool,
    decoding_key: Option<DecodingKey>,
    public_patterns: Vec<Regex>,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let public_patterns = config
            .public_path_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| PkdError::Configuration(format!("invalid public path pattern {pattern:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let decoding_key = if config.jwt_enabled {
            let secret = config
                .jwt_secret
                .as_deref()
                .ok_or_else(|| PkdError::Configuration("JWT secret must be set when authentication is enabled".to_string()))?;
            Some(DecodingKey::from_secret(secret.as_bytes()))
        } else {
            None
        };

        Ok(Self {
            jwt_enabled: config.jwt_enabled,
            decoding_key,
            public_patterns,
        })
    }

    /// Whether `path` matches one of the configured public allowlist
    /// patterns and therefore bypasses the bearer-token check.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_patterns.iter().any(|re| re.is_match(path))
    }

    /// Validate a request's `Authorization` header against `path`. Returns
    /// `Ok(None)` for a public path or when auth is disabled entirely,
    /// `Ok(Some(claims))` on a verified token, and `Err(Unauthenticated)`
    /// for anything else -- missing header, malformed scheme, bad
    /// signature, or expiry.
    pub fn authenticate(&self, path: &str, authorization_header: Option<&str>) -> Result<Option<Claims>> {
        if self.is_public(path) || !self.jwt_enabled {
            return Ok(None);
        }

        let key = self.decoding_key.as_ref().ok_or(PkdError::Unauthenticated)?;
        let header = authorization_header.ok_or(PkdError::Unauthenticated)?;
        let token = header.strip_prefix("Bearer ").ok_or(PkdError::Unauthenticated)?;

        let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256)).map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            PkdError::Unauthenticated
        })?;
        Ok(Some(data.claims))
    }
}

/// Everything the audit log records for one state-changing request (spec
/// §4.13): the actor, what they did, what it touched, and whether it
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub operation_type: Option<OperationType>,
    pub subtype: Option<String>,
    pub resource_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Thin wrapper over [`AuthAuditRepository`] that fills in the fields an
/// append-only audit row always needs (`id`, `createdAt`) so call sites
/// only build an [`AuditEntry`].
pub struct Auditor {
    repo: Arc<dyn AuthAuditRepository>,
}

impl Auditor {
    pub fn new(repo: Arc<dyn AuthAuditRepository>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, entry: AuditEntry) -> Result<Uuid> {
        let operation_type = entry.operation_type.ok_or_else(|| {
            PkdError::Unexpected("audit entry is missing its operationType".to_string())
        })?;

        let audit = AuthAudit {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            username: entry.username,
            operation_type,
            subtype: entry.subtype,
            resource_id: entry.resource_id,
            ip: entry.ip,
            user_agent: entry.user_agent,
            method: entry.method,
            path: entry.path,
            success: entry.success,
            error_message: entry.error_message,
            metadata: entry.metadata.unwrap_or(serde_json::Value::Null),
            created_at: chrono::Utc::now(),
        };
        self.repo.insert(&audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jwt_enabled: bool, secret: Option<&str>) -> AuthConfig {
        AuthConfig {
            jwt_enabled,
            jwt_secret: secret.map(str::to_string),
            public_path_patterns: vec!["^/api/health".to_string(), "^/api/auth/login$".to_string()],
        }
    }

    #[test]
    fn public_paths_bypass_the_gate_even_with_auth_enabled() {
        let gate = AuthGate::new(&config(true, Some("s3cr3t"))).unwrap();
        assert!(gate.is_public("/api/health"));
        assert!(gate.is_public("/api/health/database"));
        assert!(gate.is_public("/api/auth/login"));
        assert!(!gate.is_public("/api/upload/ldif"));
    }

    #[test]
    fn authenticate_is_noop_when_jwt_disabled() {
        let gate = AuthGate::new(&config(false, None)).unwrap();
        let result = gate.authenticate("/api/upload/ldif", None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn authenticate_rejects_missing_header_on_protected_path() {
        let gate = AuthGate::new(&config(true, Some("s3cr3t"))).unwrap();
        let result = gate.authenticate("/api/upload/ldif", None);
        assert!(result.is_err());
    }

    #[test]
    fn authenticate_rejects_non_bearer_scheme() {
        let gate = AuthGate::new(&config(true, Some("s3cr3t"))).unwrap();
        let result = gate.authenticate("/api/upload/ldif", Some("Basic dXNlcjpwYXNz"));
        assert!(result.is_err());
    }

    #[test]
    fn authenticate_accepts_a_validly_signed_unexpired_token() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let secret = "s3cr3t";
        let claims = Claims {
            sub: "u-1".to_string(),
            username: "alice".to_string(),
            roles: vec!["admin".to_string()],
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();

        let gate = AuthGate::new(&config(true, Some(secret))).unwrap();
        let result = gate.authenticate("/api/upload/ldif", Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(result.unwrap().username, "alice");
    }

    #[test]
    fn authenticate_rejects_an_expired_token() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let secret = "s3cr3t";
        let claims = Claims {
            sub: "u-1".to_string(),
            username: "alice".to_string(),
            roles: vec![],
            exp: (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();

        let gate = AuthGate::new(&config(true, Some(secret))).unwrap();
        let result = gate.authenticate("/api/upload/ldif", Some(&format!("Bearer {token}")));
        assert!(result.is_err());
    }
}
