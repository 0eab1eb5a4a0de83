//! Pooled PostgreSQL access and the fixed queries the pipeline issues.
//!
//! Connections come from a deadpool pool and are scoped to each call, so
//! every exit path releases its connection; bulk table dumps stream through
//! `COPY ... TO STDOUT` straight into the target file.

use anyhow::{Context, Result};
use deadpool_postgres::{Pool, Runtime};
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_postgres::NoTls;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "firecaster".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

pub struct Db {
    pool: Pool,
}

impl Db {
    pub fn connect(cfg: &DbConfig) -> Result<Self> {
        let mut pool_cfg = deadpool_postgres::Config::new();
        pool_cfg.host = Some(cfg.host.clone());
        pool_cfg.port = Some(cfg.port);
        pool_cfg.dbname = Some(cfg.dbname.clone());
        pool_cfg.user = Some(cfg.user.clone());
        pool_cfg.password = Some(cfg.password.clone());

        let pool = pool_cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("creating postgres pool")?;
        Ok(Db { pool })
    }

    /// Runs a statement, returning the affected row count.
    pub async fn execute(&self, statement: &str) -> Result<u64> {
        let client = self
            .pool
            .get()
            .await
            .context("acquiring postgres connection")?;
        Ok(client.execute(statement, &[]).await?)
    }

    /// Streams `COPY (query) TO STDOUT` as tab-separated CSV into `path`.
    pub async fn copy_query(&self, query: &str, path: &Path) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("acquiring postgres connection")?;

        let copy = format!("COPY ({query}) TO STDOUT WITH CSV DELIMITER '\t' HEADER");
        let stream = client
            .copy_out(copy.as_str())
            .await
            .context("starting COPY export")?;
        futures_util::pin_mut!(stream);

        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        let mut bytes_written = 0usize;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            bytes_written += chunk.len();
        }
        file.flush().await?;

        info!(bytes = bytes_written, path = %path.display(), "table exported");
        Ok(())
    }
}

/// Issues the pipeline's fixed queries against [`Db`].
pub struct Quester {
    db: Db,
}

/// Columns the mappluto aggregation consumes from the tax-lot table.
const PLUTO_EXPORT: &str = "select bbl, tract2010, yearbuilt, comarea, resarea, \
     officearea, retailarea, unitsres, bldgarea, assesstot, unitstotal, \
     numbldgs, numfloors from nyc_map_pluto_16v1";

impl Quester {
    pub fn new(db: Db) -> Self {
        Quester { db }
    }

    /// Dumps the tax-lot table for the per-tract mappluto aggregation.
    pub async fn export_mappluto(&self, path: &Path) -> Result<()> {
        self.db.copy_query(PLUTO_EXPORT, path).await
    }

    /// Dumps the building→tract lookup the municipal aggregations join on.
    pub async fn export_buildings(&self, path: &Path) -> Result<()> {
        self.db
            .copy_query(
                "select bin as \"BIN\", bbl as \"BBL\", census_tract \
                 from nyc_building_footprints",
                path,
            )
            .await
    }

    /// Assigns each stored incident the tract of the street segment whose
    /// name matches its address, server-side. Returns the updated row count.
    pub async fn assign_incident_tracts(&self) -> Result<u64> {
        let updated = self
            .db
            .execute(
                "update nyc_fire_incident set tract_id = \
                 (select right_bloc from nyc_streets_segments \
                  where nyc_fire_incident.address = nyc_streets_segments.street) \
                 where exists \
                 (select right_bloc from nyc_streets_segments \
                  where nyc_fire_incident.address = nyc_streets_segments.street)",
            )
            .await?;
        info!(updated, "incidents assigned to tracts in the database");
        Ok(updated)
    }
}
