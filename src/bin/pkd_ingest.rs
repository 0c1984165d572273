//! One-shot CLI wrapper around [`icao_pkd_core::upload::UploadCoordinator`]
//! for offline/batch ingestion outside the HTTP server -- useful for
//! backfilling a directory's worth of Master Lists without standing up the
//! full service.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use icao_pkd_core::config::Config;
use icao_pkd_core::db::executor::PgExecutor;
use icao_pkd_core::db::repo::{
    CertificateRepository, CrlRepository, MasterListRepository, PgCertificateRepository, PgCrlRepository,
    PgMasterListRepository, PgUploadRepository, PgValidationRepository, UploadRepository, ValidationRepository,
};
use icao_pkd_core::ldap::{DnScheme, LdapDirectoryWriter, LdapWriter};
use icao_pkd_core::model::ProcessingMode;
use icao_pkd_core::pool::db::DbPool;
use icao_pkd_core::pool::ldap::LdapPool;
use icao_pkd_core::progress::ProgressManager;
use icao_pkd_core::upload::{Accepted, UploadCoordinator};

#[derive(Parser)]
#[command(about = "Ingest a single LDIF or Master List file through the upload pipeline")]
struct Args {
    /// Path to the file to ingest.
    file: PathBuf,

    /// AUTO runs straight through; MANUAL stops after stage 1 (parse).
    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Skip mirroring results to LDAP -- DB-only ingestion.
    #[arg(long)]
    no_ldap: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Auto,
    Manual,
}

impl From<Mode> for ProcessingMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Auto => ProcessingMode::Auto,
            Mode::Manual => ProcessingMode::Manual,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = Config::from_env()?;
    let db_pool = Arc::new(DbPool::new(&config.database)?);
    let executor = Arc::new(PgExecutor::new(db_pool));

    let upload_repo: Arc<dyn UploadRepository> = Arc::new(PgUploadRepository::new(executor.clone()));
    let certificate_repo: Arc<dyn CertificateRepository> = Arc::new(PgCertificateRepository::new(executor.clone()));
    let crl_repo: Arc<dyn CrlRepository> = Arc::new(PgCrlRepository::new(executor.clone()));
    let masterlist_repo: Arc<dyn MasterListRepository> = Arc::new(PgMasterListRepository::new(executor.clone()));
    let validation_repo: Arc<dyn ValidationRepository> = Arc::new(PgValidationRepository::new(executor));

    let ldap_writer: Option<Arc<dyn LdapDirectoryWriter>> = if args.no_ldap {
        None
    } else {
        let ldap_pool = Arc::new(LdapPool::new(&config.ldap)?);
        Some(Arc::new(LdapWriter::new(ldap_pool, &config.ldap)))
    };

    let trust_anchor_der = match &config.trust_anchor_pem_path {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            let parsed = pem::parse(&bytes).map_err(|e| format!("invalid trust anchor PEM at {path}: {e}"))?;
            Some(parsed.into_contents())
        }
        None => None,
    };

    let coordinator = UploadCoordinator::new(
        upload_repo,
        certificate_repo,
        crl_repo,
        masterlist_repo,
        validation_repo,
        ldap_writer,
        ProgressManager::new(),
        trust_anchor_der,
        config.cms_verify_policy,
        DnScheme::V2,
        config.upload_dir.clone(),
        format!("{}/manual-artifacts", config.upload_dir),
    );

    let file_name = args
        .file
        .file_name()
        .ok_or("path has no file name")?
        .to_string_lossy()
        .to_string();
    let body = std::fs::read(&args.file)?;

    match coordinator.accept(&file_name, args.mode.into(), body).await? {
        Accepted::Started(upload) => {
            tracing::info!(upload_id = %upload.id, status = ?upload.status, "upload accepted");
            println!("accepted as upload {}", upload.id);
        }
        Accepted::Duplicate(existing) => {
            tracing::warn!(existing_upload_id = %existing.upload_id, "file already ingested, skipping");
            println!("duplicate of existing upload {}", existing.upload_id);
        }
    }

    // AUTO dispatch runs on a detached task; give it a moment to finish
    // before the process exits, since this binary has no long-running
    // server loop to keep it alive.
    if matches!(args.mode, Mode::Auto) {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }

    Ok(())
}
