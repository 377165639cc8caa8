// dbvault/src/restore/verification.rs
use anyhow::{Context, Result};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::PostgresConfig;

const VERIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Counts the tables in the `public` schema of a freshly restored database.
///
/// Informational only: callers log the outcome and never fail a restore on it.
pub async fn count_public_tables(config: &PostgresConfig) -> Result<i64> {
    timeout(VERIFICATION_TIMEOUT, query_table_count(config))
        .await
        .with_context(|| {
            format!(
                "Verification of database '{}' timed out after {} seconds",
                config.database,
                VERIFICATION_TIMEOUT.as_secs()
            )
        })?
}

async fn query_table_count(config: &PostgresConfig) -> Result<i64> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database);

    let mut conn = PgConnection::connect_with(&options)
        .await
        .with_context(|| format!("Failed to connect to restored database '{}'", config.database))?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pg_catalog.pg_tables WHERE schemaname = 'public'")
        .fetch_one(&mut conn)
        .await
        .context("Failed to count tables in public schema")?;

    conn.close().await.ok();
    Ok(count)
}
