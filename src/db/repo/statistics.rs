//! Cross-entity aggregation queries (spec §4.4 `StatisticsRepository`),
//! backing the read views under `GET /api/upload/{statistics,countries,
//! countries/detailed}` and `GET /api/certificates/countries`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::executor::Executor;
use crate::error::Result;

/// Per-country rollup for the "detailed" countries view.
#[derive(Debug, Clone, Default)]
pub struct CountryStats {
    pub country_code: String,
    pub csca_count: u64,
    pub dsc_count: u64,
    pub dsc_nc_count: u64,
    pub crl_count: u64,
}

/// Overall upload/certificate counters for the dashboard landing view.
#[derive(Debug, Clone, Default)]
pub struct OverallStatistics {
    pub total_uploads: u64,
    pub total_certificates: u64,
    pub total_in_ldap: u64,
    pub total_countries: u64,
}

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn overall(&self) -> Result<OverallStatistics>;
    async fn by_country(&self) -> Result<Vec<CountryStats>>;
}

pub struct PgStatisticsRepository {
    executor: Arc<dyn Executor>,
}

impl PgStatisticsRepository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl StatisticsRepository for PgStatisticsRepository {
    async fn overall(&self) -> Result<OverallStatistics> {
        let rows = self
            .executor
            .execute_query(
                "SELECT \
                   (SELECT count(*) FROM uploads) AS total_uploads, \
                   (SELECT count(*) FROM certificates) AS total_certificates, \
                   (SELECT count(*) FROM certificates WHERE stored_in_ldap) AS total_in_ldap, \
                   (SELECT count(DISTINCT country_code) FROM certificates) AS total_countries",
                &[],
            )
            .await?;
        match rows.first() {
            Some(row) => Ok(OverallStatistics {
                total_uploads: row.try_get::<i64>("total_uploads")? as u64,
                total_certificates: row.try_get::<i64>("total_certificates")? as u64,
                total_in_ldap: row.try_get::<i64>("total_in_ldap")? as u64,
                total_countries: row.try_get::<i64>("total_countries")? as u64,
            }),
            None => Ok(OverallStatistics::default()),
        }
    }

    async fn by_country(&self) -> Result<Vec<CountryStats>> {
        let rows = self
            .executor
            .execute_query(
                "SELECT country_code, \
                   count(*) FILTER (WHERE certificate_type = 'CSCA') AS csca_count, \
                   count(*) FILTER (WHERE certificate_type = 'DSC') AS dsc_count, \
                   count(*) FILTER (WHERE certificate_type = 'DSC_NC') AS dsc_nc_count, \
                   0::bigint AS crl_count \
                 FROM certificates GROUP BY country_code ORDER BY country_code",
                &[],
            )
            .await?;
        rows.iter()
            .map(|r| {
                Ok(CountryStats {
                    country_code: r.try_get("country_code")?,
                    csca_count: r.try_get::<i64>("csca_count")? as u64,
                    dsc_count: r.try_get::<i64>("dsc_count")? as u64,
                    dsc_nc_count: r.try_get::<i64>("dsc_nc_count")? as u64,
                    crl_count: r.try_get::<i64>("crl_count")? as u64,
                })
            })
            .collect()
    }
}
