//! Upload repository (spec §4.4 `UploadRepository`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::executor::{Executor, QueryParam};
use crate::error::{PkdError, Result};
use crate::model::{FileFormat, ProcessingMode, Upload, UploadStatus};

/// One entry of `UploadRepository::get_change_history`: an upload alongside
/// the delta in validation counters versus the previous upload in the
/// ordered history (spec §4.4).
#[derive(Debug, Clone)]
pub struct UploadHistoryEntry {
    pub upload: Upload,
    pub valid_count_delta: i64,
    pub invalid_count_delta: i64,
}

#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn insert(&self, upload: &Upload) -> Result<Uuid>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Upload>>;
    async fn find_by_file_hash(&self, hash: &str) -> Result<Option<Upload>>;
    async fn update_status(&self, id: Uuid, status: UploadStatus, error_message: Option<&str>) -> Result<()>;
    async fn update_statistics(&self, id: Uuid, counts: &UploadStatisticsDelta) -> Result<()>;
    async fn update_progress(&self, id: Uuid, total: u32, processed: u32) -> Result<()>;
    async fn get_change_history(&self, limit: u32) -> Result<Vec<UploadHistoryEntry>>;
}

/// Statistics fields updated together at the end of a processing pass;
/// grouped so callers don't have to pass ten positional integers (spec
/// §4.4 `updateStatistics(id, counts…)`).
#[derive(Debug, Clone, Default)]
pub struct UploadStatisticsDelta {
    pub csca_count: u32,
    pub dsc_count: u32,
    pub dsc_nc_count: u32,
    pub crl_count: u32,
    pub ml_count: u32,
    pub mlsc_count: u32,
    pub valid_count: u32,
    pub invalid_count: u32,
    pub warning_count: u32,
}

pub struct PgUploadRepository {
    executor: Arc<dyn Executor>,
}

impl PgUploadRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn row_to_upload(row: &crate::db::executor::Row) -> Result<Upload> {
        Ok(Upload {
            id: row.try_get("id")?,
            file_name: row.try_get("file_name")?,
            original_file_name: row.try_get("original_file_name")?,
            file_hash: row.try_get("file_hash")?,
            file_size: row.try_get::<i64>("file_size")? as u64,
            file_format: parse_file_format(&row.try_get::<String>("file_format")?)?,
            processing_mode: parse_processing_mode(&row.try_get::<String>("processing_mode")?)?,
            status: parse_upload_status(&row.try_get::<String>("status")?)?,
            csca_count: row.try_get::<i32>("csca_count")? as u32,
            dsc_count: row.try_get::<i32>("dsc_count")? as u32,
            dsc_nc_count: row.try_get::<i32>("dsc_nc_count")? as u32,
            crl_count: row.try_get::<i32>("crl_count")? as u32,
            ml_count: row.try_get::<i32>("ml_count")? as u32,
            mlsc_count: row.try_get::<i32>("mlsc_count")? as u32,
            total_entries: row.try_get::<i32>("total_entries")? as u32,
            processed_entries: row.try_get::<i32>("processed_entries")? as u32,
            valid_count: row.try_get::<i32>("valid_count")? as u32,
            invalid_count: row.try_get::<i32>("invalid_count")? as u32,
            warning_count: row.try_get::<i32>("warning_count")? as u32,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            file_path: row.try_get("file_path")?,
        })
    }
}

#[async_trait]
impl UploadRepository for PgUploadRepository {
    async fn insert(&self, upload: &Upload) -> Result<Uuid> {
        self.executor
            .execute_command(
                "INSERT INTO uploads (id, file_name, original_file_name, file_hash, file_size, \
                 file_format, processing_mode, status, created_at, file_path) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    QueryParam::Uuid(upload.id),
                    QueryParam::Text(upload.file_name.clone()),
                    QueryParam::Text(upload.original_file_name.clone()),
                    QueryParam::Text(upload.file_hash.clone()),
                    QueryParam::Int(upload.file_size as i64),
                    QueryParam::Text(file_format_str(upload.file_format).to_string()),
                    QueryParam::Text(processing_mode_str(upload.processing_mode).to_string()),
                    QueryParam::Text(upload_status_str(upload.status).to_string()),
                    QueryParam::Timestamp(upload.created_at),
                    QueryParam::Text(upload.file_path.clone()),
                ],
            )
            .await?;
        Ok(upload.id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Upload>> {
        let rows = self
            .executor
            .execute_query("SELECT * FROM uploads WHERE id = $1", &[QueryParam::Uuid(id)])
            .await?;
        rows.first().map(Self::row_to_upload).transpose()
    }

    async fn find_by_file_hash(&self, hash: &str) -> Result<Option<Upload>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM uploads WHERE file_hash = $1",
                &[QueryParam::Text(hash.to_string())],
            )
            .await?;
        rows.first().map(Self::row_to_upload).transpose()
    }

    async fn update_status(&self, id: Uuid, status: UploadStatus, error_message: Option<&str>) -> Result<()> {
        let completed_at: Option<DateTime<Utc>> = matches!(status, UploadStatus::Completed | UploadStatus::Failed)
            .then(Utc::now);
        self.executor
            .execute_command(
                "UPDATE uploads SET status = $1, error_message = $2, completed_at = $3 WHERE id = $4",
                &[
                    QueryParam::Text(upload_status_str(status).to_string()),
                    QueryParam::OptText(error_message.map(str::to_string)),
                    QueryParam::OptTimestamp(completed_at),
                    QueryParam::Uuid(id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_statistics(&self, id: Uuid, counts: &UploadStatisticsDelta) -> Result<()> {
        self.executor
            .execute_command(
                "UPDATE uploads SET csca_count = $1, dsc_count = $2, dsc_nc_count = $3, \
                 crl_count = $4, ml_count = $5, mlsc_count = $6, valid_count = $7, \
                 invalid_count = $8, warning_count = $9 WHERE id = $10",
                &[
                    QueryParam::Int(counts.csca_count as i64),
                    QueryParam::Int(counts.dsc_count as i64),
                    QueryParam::Int(counts.dsc_nc_count as i64),
                    QueryParam::Int(counts.crl_count as i64),
                    QueryParam::Int(counts.ml_count as i64),
                    QueryParam::Int(counts.mlsc_count as i64),
                    QueryParam::Int(counts.valid_count as i64),
                    QueryParam::Int(counts.invalid_count as i64),
                    QueryParam::Int(counts.warning_count as i64),
                    QueryParam::Uuid(id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, total: u32, processed: u32) -> Result<()> {
        self.executor
            .execute_command(
                "UPDATE uploads SET total_entries = $1, processed_entries = $2 WHERE id = $3",
                &[
                    QueryParam::Int(total as i64),
                    QueryParam::Int(processed as i64),
                    QueryParam::Uuid(id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_change_history(&self, limit: u32) -> Result<Vec<UploadHistoryEntry>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT * FROM uploads ORDER BY created_at DESC LIMIT $1",
                &[QueryParam::Int(limit as i64)],
            )
            .await?;

        let uploads = rows.iter().map(Self::row_to_upload).collect::<Result<Vec<_>>>()?;
        let mut history = Vec::with_capacity(uploads.len());
        for (idx, upload) in uploads.iter().enumerate() {
            let previous = uploads.get(idx + 1);
            let valid_count_delta = previous
                .map(|p| upload.valid_count as i64 - p.valid_count as i64)
                .unwrap_or(0);
            let invalid_count_delta = previous
                .map(|p| upload.invalid_count as i64 - p.invalid_count as i64)
                .unwrap_or(0);
            history.push(UploadHistoryEntry {
                upload: upload.clone(),
                valid_count_delta,
                invalid_count_delta,
            });
        }
        Ok(history)
    }
}

fn file_format_str(format: FileFormat) -> &'static str {
    match format {
        FileFormat::Ldif => "LDIF",
        FileFormat::Ml => "ML",
        FileFormat::Pem => "PEM",
        FileFormat::Der => "DER",
        FileFormat::Cer => "CER",
        FileFormat::P7b => "P7B",
        FileFormat::Crl => "CRL",
    }
}

fn parse_file_format(value: &str) -> Result<FileFormat> {
    match value {
        "LDIF" => Ok(FileFormat::Ldif),
        "ML" => Ok(FileFormat::Ml),
        "PEM" => Ok(FileFormat::Pem),
        "DER" => Ok(FileFormat::Der),
        "CER" => Ok(FileFormat::Cer),
        "P7B" => Ok(FileFormat::P7b),
        "CRL" => Ok(FileFormat::Crl),
        other => Err(PkdError::Unexpected(format!("unknown file format in storage: {other}"))),
    }
}

fn processing_mode_str(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Auto => "AUTO",
        ProcessingMode::Manual => "MANUAL",
    }
}

fn parse_processing_mode(value: &str) -> Result<ProcessingMode> {
    match value {
        "AUTO" => Ok(ProcessingMode::Auto),
        "MANUAL" => Ok(ProcessingMode::Manual),
        other => Err(PkdError::Unexpected(format!("unknown processing mode in storage: {other}"))),
    }
}

fn upload_status_str(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Processing => "PROCESSING",
        UploadStatus::Pending => "PENDING",
        UploadStatus::Completed => "COMPLETED",
        UploadStatus::Failed => "FAILED",
        UploadStatus::Duplicate => "DUPLICATE",
    }
}

fn parse_upload_status(value: &str) -> Result<UploadStatus> {
    match value {
        "PROCESSING" => Ok(UploadStatus::Processing),
        "PENDING" => Ok(UploadStatus::Pending),
        "COMPLETED" => Ok(UploadStatus::Completed),
        "FAILED" => Ok(UploadStatus::Failed),
        "DUPLICATE" => Ok(UploadStatus::Duplicate),
        other => Err(PkdError::Unexpected(format!("unknown upload status in storage: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_format_round_trips_through_its_string_form() {
        for format in [FileFormat::Ldif, FileFormat::Ml, FileFormat::Crl, FileFormat::P7b] {
            assert_eq!(parse_file_format(file_format_str(format)).unwrap(), format);
        }
    }

    #[test]
    fn upload_status_round_trips_through_its_string_form() {
        for status in [UploadStatus::Processing, UploadStatus::Completed, UploadStatus::Duplicate] {
            assert_eq!(parse_upload_status(upload_status_str(status)).unwrap(), status);
        }
    }
}
