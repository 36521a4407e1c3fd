use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let records_table = config.records_table();
    let expiry_table = config.expiry_index_table();

    let create_records = format!(
        "CREATE TABLE IF NOT EXISTS {records_table} (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            value TEXT NOT NULL,
            version BIGINT NOT NULL DEFAULT 1,
            PRIMARY KEY (kind, id)
        )"
    );

    // text_pattern_ops lets prefix scans use the index.
    let create_records_prefix_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}records_prefix_idx ON {records_table} (kind, id text_pattern_ops)",
        config.table_prefix
    );

    let create_expiry = format!(
        "CREATE TABLE IF NOT EXISTS {expiry_table} (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            expires_at_ms BIGINT NOT NULL,
            PRIMARY KEY (kind, id)
        )"
    );

    let create_expiry_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}expiry_at_idx ON {expiry_table} (kind, expires_at_ms)",
        config.table_prefix
    );

    sqlx::query(&create_records).execute(pool).await?;
    sqlx::query(&create_records_prefix_idx)
        .execute(pool)
        .await?;
    sqlx::query(&create_expiry).execute(pool).await?;
    sqlx::query(&create_expiry_idx).execute(pool).await?;

    Ok(())
}
