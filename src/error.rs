//! Crate-wide error type for the PKD ingestion core

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, PkdError>;

/// Main error type for ingestion, validation and persistence operations
#[derive(Error, Debug)]
pub enum PkdError {
    // -- Input errors ---------------------------------------------------
    #[error("invalid LDIF: {0}")]
    InvalidLdif(String),

    #[error("invalid CMS structure: {0}")]
    InvalidCms(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("duplicate file, existing upload {existing_upload_id}")]
    DuplicateFile { existing_upload_id: uuid::Uuid },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    // -- Crypto errors ----------------------------------------------------
    #[error("CSCA signature invalid: {0}")]
    CscaSignatureInvalid(String),

    #[error("DSC signature invalid: {0}")]
    DscSignatureInvalid(String),

    #[error("issuing CSCA not found for DN {0}")]
    CscaNotFound(String),

    #[error("circular reference detected while building trust chain at DN {0}")]
    CircularReference(String),

    #[error("trust chain exceeded maximum depth of {0}")]
    MaxDepthExceeded(usize),

    #[error("certificate not yet valid (notBefore is in the future)")]
    NotYetValid,

    #[error("X.509 parse error: {0}")]
    X509Parse(String),

    // -- Persistence errors ------------------------------------------------
    #[error("database connection failed: {0}")]
    DbConnectionFailed(String),

    #[error("database save failed: {0}")]
    DbSaveFailed(String),

    #[error("LDAP connection failed: {0}")]
    LdapConnectionFailed(String),

    #[error("LDAP save failed: {0}")]
    LdapSaveFailed(String),

    #[error("connection pool exhausted after waiting {0:?}")]
    PoolTimeout(std::time::Duration),

    // -- Protocol errors -----------------------------------------------------
    #[error("unauthenticated request")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    // -- Internal / wrapped errors --------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl PkdError {
    /// Stable machine-readable code, mirrored in `ValidationResult::error_code`
    /// and in the HTTP-facing `error.code` field described by the spec.
    pub fn code(&self) -> &'static str {
        match self {
            PkdError::InvalidLdif(_) => "INVALID_LDIF",
            PkdError::InvalidCms(_) => "INVALID_CMS",
            PkdError::InvalidFilename(_) => "INVALID_FILENAME",
            PkdError::TooLarge { .. } => "TOO_LARGE",
            PkdError::DuplicateFile { .. } => "DUPLICATE_FILE",
            PkdError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            PkdError::CscaSignatureInvalid(_) => "CSCA_SIGNATURE_INVALID",
            PkdError::DscSignatureInvalid(_) => "DSC_SIGNATURE_INVALID",
            PkdError::CscaNotFound(_) => "CSCA_NOT_FOUND",
            PkdError::CircularReference(_) => "CIRCULAR_REFERENCE",
            PkdError::MaxDepthExceeded(_) => "MAX_DEPTH_EXCEEDED",
            PkdError::NotYetValid => "NOT_YET_VALID",
            PkdError::X509Parse(_) => "X509_PARSE_ERROR",
            PkdError::DbConnectionFailed(_) => "DB_CONNECTION_FAILED",
            PkdError::DbSaveFailed(_) => "DB_SAVE_FAILED",
            PkdError::LdapConnectionFailed(_) => "LDAP_CONNECTION_FAILED",
            PkdError::LdapSaveFailed(_) => "LDAP_SAVE_FAILED",
            PkdError::PoolTimeout(_) => "POOL_TIMEOUT",
            PkdError::Unauthenticated => "UNAUTHENTICATED",
            PkdError::Forbidden(_) => "FORBIDDEN",
            PkdError::NotFound(_) => "NOT_FOUND",
            PkdError::Io(_) => "IO_ERROR",
            PkdError::Serialization(_) => "SERIALIZATION_ERROR",
            PkdError::Base64(_) => "BASE64_ERROR",
            PkdError::Configuration(_) => "CONFIGURATION_ERROR",
            PkdError::Unexpected(_) => "UNEXPECTED",
        }
    }

    /// HTTP status an external collaborator would map this to (not used by
    /// the core itself, but kept alongside `code()` since both are part of
    /// the same error taxonomy from spec §7).
    pub fn http_status(&self) -> u16 {
        match self {
            PkdError::DuplicateFile { .. } => 409,
            PkdError::Unauthenticated => 401,
            PkdError::Forbidden(_) => 403,
            PkdError::NotFound(_) => 404,
            PkdError::InvalidLdif(_)
            | PkdError::InvalidCms(_)
            | PkdError::InvalidFilename(_)
            | PkdError::TooLarge { .. }
            | PkdError::UnsupportedFormat(_) => 400,
            _ => 500,
        }
    }
}
