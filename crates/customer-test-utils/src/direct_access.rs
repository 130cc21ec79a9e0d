//! Raw database access for assertions.
//!
//! Opens its own pool from the instance's credentials. Nothing here goes
//! through the service's repositories, so tests can check what was actually
//! stored.

use crate::container::InstanceHandle;
use crate::error::HarnessError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, instrument};

const RAW_POOL_CONNECTIONS: u32 = 2;

/// Open a fresh pool against the instance, bypassing the service.
///
/// # Errors
///
/// - `HarnessError::NotReady` - instance not started
/// - `HarnessError::Database` - connection failed
#[instrument(skip_all, name = "harness.direct_access.connect")]
pub async fn raw_client(handle: &InstanceHandle) -> Result<PgPool, HarnessError> {
    let info = handle.connection_info()?;
    let pool = PgPoolOptions::new()
        .max_connections(RAW_POOL_CONNECTIONS)
        .connect_with(info.connect_options())
        .await?;
    debug!(target: "harness.direct_access", address = %info.address, "Raw client connected");
    Ok(pool)
}

/// Raw pool plus a few table helpers.
#[derive(Debug, Clone)]
pub struct DirectAccess {
    pool: PgPool,
}

impl DirectAccess {
    /// # Errors
    ///
    /// See [`raw_client`].
    pub async fn connect(handle: &InstanceHandle) -> Result<Self, HarnessError> {
        Ok(Self {
            pool: raw_client(handle).await?,
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `SELECT COUNT(*)` on `table`.
    ///
    /// # Errors
    ///
    /// `HarnessError::Database` for an invalid identifier or a failed query.
    pub async fn count_rows(&self, table: &str) -> Result<i64, HarnessError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Empty `tables` and reset their identity sequences.
    ///
    /// # Errors
    ///
    /// `HarnessError::Database` for an invalid identifier or a failed query.
    #[instrument(skip_all, name = "harness.direct_access.truncate", fields(tables = ?tables))]
    pub async fn truncate(&self, tables: &[&str]) -> Result<(), HarnessError> {
        if tables.is_empty() {
            return Ok(());
        }
        let quoted = tables
            .iter()
            .map(|table| quote_identifier(table))
            .collect::<Result<Vec<_>, _>>()?;
        let sql = format!("TRUNCATE {} RESTART IDENTITY CASCADE", quoted.join(", "));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Accept plain lower-case identifiers only, and quote them.
fn quote_identifier(name: &str) -> Result<String, HarnessError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(HarnessError::Database(format!(
            "invalid table name '{}'",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::InstanceState;
    use tokio::sync::watch;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("customer").unwrap(), "\"customer\"");
        assert_eq!(
            quote_identifier("_sqlx_migrations").unwrap(),
            "\"_sqlx_migrations\""
        );
    }

    #[test]
    fn test_quote_identifier_rejects_injection() {
        for bad in ["", "1abc", "customer; DROP TABLE x", "Customer", "a\"b"] {
            assert!(quote_identifier(bad).is_err(), "'{}' should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_raw_client_requires_ready_instance() {
        let (_tx, rx) = watch::channel(InstanceState::Starting);
        let result = raw_client(&InstanceHandle::from_watch_receiver(rx)).await;
        assert!(matches!(result, Err(HarnessError::NotReady)));
    }
}
