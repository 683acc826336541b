// ============================================================================
// PIPESTOCK - DATABASE ACCESS
// ============================================================================
// Module: shared/src/database.rs
// Description: Pool construction from settings and the transaction helper
//              every mutating operation runs under
// ============================================================================

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseSettings;
use crate::error::Result;

/// Open the Postgres pool described by the configured settings. Services
/// borrow the resulting `PgPool`; nothing below this layer opens its own
/// connections.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .test_before_acquire(settings.test_before_acquire);

    if let Some(idle_timeout) = settings.idle_timeout {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }
    if let Some(max_lifetime) = settings.max_lifetime {
        options = options.max_lifetime(Duration::from_secs(max_lifetime));
    }

    let pool = options.connect(&settings.url).await?;
    info!(
        max_connections = settings.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Begin a transaction at SERIALIZABLE isolation. Every mutating inventory
/// operation runs inside exactly one of these; the transaction boundary is
/// the operation boundary.
pub async fn begin_serializable(pool: &PgPool) -> Result<Transaction<'_, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}
