use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use medidoc_state::error::StateError;
use medidoc_state::key::{KeyKind, StateKey};
use medidoc_state::store::{CasResult, StateStore, Versioned};

use crate::config::PostgresConfig;
use crate::migrations;

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StateError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StateError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(StateError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }

    Ok(options)
}

/// Escape `LIKE` metacharacters and append a trailing wildcard.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn version_from_row(version: i64) -> u64 {
    u64::try_from(version).unwrap_or(0)
}

fn backend(e: &sqlx::Error) -> StateError {
    StateError::Backend(e.to_string())
}

/// PostgreSQL-backed implementation of [`StateStore`].
///
/// Records live in a single `(kind, id)`-keyed table with a `version` column.
/// Compare-and-swap is one conditional `UPDATE ... WHERE version = $n`, so
/// concurrent redeemers are serialised by the row lock.
pub struct PostgresStateStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresStateStore {
    /// Create a new `PostgresStateStore` from the provided configuration.
    ///
    /// Connects to `PostgreSQL`, creates the connection pool, and runs
    /// migrations to ensure the required tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if pool creation fails, or
    /// [`StateError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StateError> {
        let connect_options = build_connect_options(&config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a `PostgresStateStore` from an existing pool and config.
    /// Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StateError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| backend(&e))?;
        tracing::info!(table = %config.records_table(), "postgres state store ready");

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError> {
        let table = self.config.records_table();

        // INSERT ... ON CONFLICT DO NOTHING: only inserts if the key is absent.
        let query = format!(
            "INSERT INTO {table} (kind, id, value, version) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (kind, id) DO NOTHING"
        );

        let result = sqlx::query(&query)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        let table = self.config.records_table();
        let query = format!("SELECT value, version FROM {table} WHERE kind = $1 AND id = $2");

        let row: Option<(String, i64)> = sqlx::query_as(&query)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(row.map(|(value, version)| Versioned {
            value,
            version: version_from_row(version),
        }))
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError> {
        let table = self.config.records_table();
        let expected_version = i64::try_from(expected_version).unwrap_or(i64::MAX);

        // Conditional update: only succeeds if the version still matches.
        let update_query = format!(
            "UPDATE {table} \
             SET value = $1, version = version + 1 \
             WHERE kind = $2 AND id = $3 AND version = $4"
        );

        let result = sqlx::query(&update_query)
            .bind(new_value)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        if result.rows_affected() > 0 {
            return Ok(CasResult::Ok);
        }

        // Lost the race or the key is missing; report what is stored now.
        match self.get_versioned(key).await? {
            Some(current) => Ok(CasResult::Conflict {
                current_value: Some(current.value),
                current_version: current.version,
            }),
            None => Ok(CasResult::Conflict {
                current_value: None,
                current_version: 0,
            }),
        }
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let table = self.config.records_table();
        let query = format!("DELETE FROM {table} WHERE kind = $1 AND id = $2");

        let result = sqlx::query(&query)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let table = self.config.records_table();
        let pattern = like_prefix(prefix.unwrap_or(""));

        let query = format!(
            "SELECT id, value FROM {table} \
             WHERE kind = $1 AND id LIKE $2 ESCAPE '\\'"
        );

        let rows: Vec<(String, String)> = sqlx::query_as(&query)
            .bind(kind.as_str())
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(rows)
    }

    async fn index_expiry(&self, key: &StateKey, expires_at_ms: i64) -> Result<(), StateError> {
        let table = self.config.expiry_index_table();

        let query = format!(
            "INSERT INTO {table} (kind, id, expires_at_ms) VALUES ($1, $2, $3) \
             ON CONFLICT (kind, id) DO UPDATE SET expires_at_ms = $3"
        );

        sqlx::query(&query)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .bind(expires_at_ms)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(())
    }

    async fn remove_expiry_index(&self, key: &StateKey) -> Result<(), StateError> {
        let table = self.config.expiry_index_table();
        let query = format!("DELETE FROM {table} WHERE kind = $1 AND id = $2");

        sqlx::query(&query)
            .bind(key.kind.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(())
    }

    async fn get_expired(
        &self,
        kind: KeyKind,
        now_ms: i64,
    ) -> Result<Vec<StateKey>, StateError> {
        let table = self.config.expiry_index_table();
        let query = format!("SELECT id FROM {table} WHERE kind = $1 AND expires_at_ms <= $2");

        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .bind(kind.as_str())
            .bind(now_ms)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        Ok(rows
            .into_iter()
            .map(|(id,)| StateKey::new(kind.clone(), id))
            .collect())
    }
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/medidoc_test".to_string()),
            table_prefix: format!("test_{}_", uuid::Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = PostgresStateStore::new(test_config())
            .await
            .expect("pool creation should succeed");
        medidoc_state::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cas_has_one_winner() {
        let store = PostgresStateStore::new(test_config())
            .await
            .expect("pool creation should succeed");
        medidoc_state::testing::run_concurrent_cas_test(Arc::new(store))
            .await
            .expect("concurrent CAS test should pass");
    }
}
