//! Postgres implementation of [`DestinationLookup`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Destination, DestinationLookup};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info, warn};

use crate::error::{DataError, Result};

/// Matches a code against either the section id or the section name.
const LOOKUP_SQL: &str = r"
    SELECT box_folder_id::TEXT, experiment_id::TEXT, section_name::TEXT
    FROM greenhouse_box
    INNER JOIN section USING (section_name)
    WHERE section_id::TEXT = $1 OR section_name = $1
";

const VERSION_SQL: &str = "SELECT version()";

type LookupRow = (Option<String>, Option<String>, Option<String>);

/// Connection settings for the lookup store.
#[derive(Clone)]
pub struct ConnectSettings {
    /// Role used to connect.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Upper bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    /// Pool size.
    pub max_connections: u32,
}

impl fmt::Debug for ConnectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectSettings")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

impl ConnectSettings {
    fn options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

/// Destination lookup backed by a Postgres pool.
#[derive(Clone)]
pub struct PgDestinationLookup {
    pool: PgPool,
}

impl PgDestinationLookup {
    /// Connect a pool using `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ConnectFailed`] when no connection can be opened.
    pub async fn connect(settings: &ConnectSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(settings.options())
            .await
            .map_err(|source| DataError::ConnectFailed {
                host: settings.host.clone(),
                source,
            })?;
        info!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            "lookup store connected"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every destination registered for `code`, in row order.
    ///
    /// Rows with a null column are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::QueryFailed`] when the query fails.
    pub async fn fetch_destinations(&self, code: &str) -> Result<Vec<Destination>> {
        let rows: Vec<LookupRow> = sqlx::query_as(LOOKUP_SQL)
            .bind(code)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "lookup_destinations",
                source,
            })?;

        let mut destinations = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                (Some(folder), Some(experiment), Some(section)) => {
                    destinations.push(Destination::new(folder, experiment, section));
                }
                _ => warn!(code, "skipping lookup row with null columns"),
            }
        }
        debug!(code, rows = destinations.len(), "lookup completed");
        Ok(destinations)
    }

    /// Server version string.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::QueryFailed`] when the query fails.
    pub async fn server_version(&self) -> Result<String> {
        let (version,): (String,) = sqlx::query_as(VERSION_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "server_version",
                source,
            })?;
        Ok(version)
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DestinationLookup for PgDestinationLookup {
    async fn lookup(&self, code: &str) -> anyhow::Result<Vec<Destination>> {
        Ok(self.fetch_destinations(code).await?)
    }

    async fn check(&self) -> anyhow::Result<()> {
        let version = self.server_version().await?;
        info!(version = %version, "lookup store reachable");
        Ok(())
    }
}
