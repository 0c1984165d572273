//! Persisted entity shapes (spec §3). These are the row types the
//! repositories (`db::repo`) read and write; they are also what gets
//! serialized to JSON for any external collaborator (camelCase per
//! SPEC_FULL.md §D.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Ldif,
    Ml,
    Pem,
    Der,
    Cer,
    P7b,
    Crl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Processing,
    Pending,
    Completed,
    Failed,
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: Uuid,
    pub file_name: String,
    pub original_file_name: String,
    pub file_hash: String,
    pub file_size: u64,
    pub file_format: FileFormat,
    pub processing_mode: ProcessingMode,
    pub status: UploadStatus,
    pub csca_count: u32,
    pub dsc_count: u32,
    pub dsc_nc_count: u32,
    pub crl_count: u32,
    pub ml_count: u32,
    pub mlsc_count: u32,
    pub total_entries: u32,
    pub processed_entries: u32,
    pub valid_count: u32,
    pub invalid_count: u32,
    pub warning_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub file_path: String,
}

impl Upload {
    pub fn new(
        file_name: String,
        original_file_name: String,
        file_hash: String,
        file_size: u64,
        file_format: FileFormat,
        processing_mode: ProcessingMode,
        file_path: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            original_file_name,
            file_hash,
            file_size,
            file_format,
            processing_mode,
            status: UploadStatus::Processing,
            csca_count: 0,
            dsc_count: 0,
            dsc_nc_count: 0,
            crl_count: 0,
            ml_count: 0,
            mlsc_count: 0,
            total_entries: 0,
            processed_entries: 0,
            valid_count: 0,
            invalid_count: 0,
            warning_count: 0,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            file_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertificateType {
    Csca,
    Dsc,
    #[serde(rename = "DSC_NC")]
    DscNc,
    #[serde(rename = "MLSC")]
    Mlsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Valid,
    #[serde(rename = "EXPIRED_VALID")]
    ExpiredValid,
    Invalid,
    Pending,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub certificate_type: CertificateType,
    pub country_code: String,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial_number: String,
    pub fingerprint_sha256: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub certificate_binary: Vec<u8>,
    pub validation_status: ValidationStatus,
    pub validation_message: Option<String>,
    pub ldap_dn: Option<String>,
    pub stored_in_ldap: bool,
    pub stored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub certificate_id: Uuid,
    pub upload_id: Uuid,
    pub fingerprint: String,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial_number: String,
    pub certificate_type: CertificateType,
    pub country_code: String,
    pub trust_chain_valid: bool,
    pub trust_chain_message: String,
    pub trust_chain_path: String,
    pub csca_found: bool,
    pub csca_subject_dn: Option<String>,
    pub signature_verified: bool,
    pub signature_algorithm: String,
    pub validity_check_passed: bool,
    pub is_expired: bool,
    pub is_not_yet_valid: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub is_self_signed: bool,
    pub path_length_constraint: Option<u32>,
    pub key_usage_valid: bool,
    pub key_usage_flags: Vec<String>,
    pub crl_check_status: Option<String>,
    pub crl_check_message: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub validation_duration_ms: u64,
    pub validation_status: ValidationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertificate {
    pub id: Uuid,
    pub crl_id: Uuid,
    pub serial_number: String,
    pub revocation_date: DateTime<Utc>,
    pub revocation_reason: RevocationReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crl {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub country_code: String,
    pub issuer_dn: String,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub crl_number: Option<String>,
    pub fingerprint_sha256: String,
    pub crl_binary: Vec<u8>,
    pub validation_status: ValidationStatus,
    pub ldap_dn: Option<String>,
    pub stored_in_ldap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterListRecord {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub signer_country: String,
    pub signer_dn: String,
    pub version: Option<i32>,
    pub csca_certificate_count: u32,
    pub fingerprint_sha256: String,
    pub ml_binary: Vec<u8>,
    pub ldap_dn: Option<String>,
    pub stored_in_ldap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationListDefect {
    pub certificate_issuer_dn: String,
    pub certificate_serial_number: String,
    pub defect_type_oid: String,
    pub defect_category: String,
    pub defect_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationList {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub signer_country: String,
    pub signer_dn: String,
    pub fingerprint_sha256: String,
    pub defects: Vec<DeviationListDefect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    FileUpload,
    UploadDelete,
    CertExport,
    AuthLogin,
    AuthLogout,
    Validate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAudit {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub operation_type: OperationType,
    pub subtype: Option<String>,
    pub resource_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdifStructureEntry {
    pub upload_id: Uuid,
    pub dn: String,
    pub attribute_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingUploadSummary {
    pub upload_id: Uuid,
    pub file_name: String,
    pub upload_timestamp: DateTime<Utc>,
    pub status: UploadStatus,
    pub processing_mode: ProcessingMode,
    pub file_format: FileFormat,
}

impl From<&Upload> for ExistingUploadSummary {
    fn from(upload: &Upload) -> Self {
        Self {
            upload_id: upload.id,
            file_name: upload.file_name.clone(),
            upload_timestamp: upload.created_at,
            status: upload.status,
            processing_mode: upload.processing_mode,
            file_format: upload.file_format,
        }
    }
}
