//! One-shot CLI wrapper around [`icao_pkd_core::migrate::migrate_dn_scheme`]
//! (spec §B.3, `POST /api/internal/migrate-ldap-dns`'s core-side operation
//! run standalone, outside the HTTP server).

use std::sync::Arc;

use clap::Parser;
use icao_pkd_core::config::Config;
use icao_pkd_core::db::executor::PgExecutor;
use icao_pkd_core::db::repo::{CertificateRepository, PgCertificateRepository};
use icao_pkd_core::ldap::LdapWriter;
use icao_pkd_core::migrate::migrate_dn_scheme;
use icao_pkd_core::pool::db::DbPool;
use icao_pkd_core::pool::ldap::LdapPool;

#[derive(Parser)]
#[command(about = "Migrate LDAP certificate entries from the legacy v1 DN scheme to v2")]
struct Args {
    /// Report what would migrate without writing anything.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = Config::from_env()?;
    let db_pool = Arc::new(DbPool::new(&config.database)?);
    let executor = Arc::new(PgExecutor::new(db_pool));
    let certificate_repo: Arc<dyn CertificateRepository> = Arc::new(PgCertificateRepository::new(executor));

    if args.dry_run {
        tracing::warn!("dry-run is not yet wired to a read-only LDAP writer; refusing to run");
        return Err("--dry-run requires a read-only LDAP writer, which this build does not implement".into());
    }

    let ldap_pool = Arc::new(LdapPool::new(&config.ldap)?);
    let writer = LdapWriter::new(ldap_pool, &config.ldap);

    let report = migrate_dn_scheme(certificate_repo.as_ref(), &writer).await?;
    tracing::info!(
        candidates = report.candidates,
        migrated = report.migrated,
        skipped = report.skipped,
        failed = report.failed,
        "DN migration complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
