use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::domain::{Advisor, ExApiLink, SampledSecurity};
use crate::error::{ActivatorError, Result};
use crate::remote::RemoteCatalog;

/// MySQL-backed catalog of advisors, integration links and securities
#[derive(Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
    query_timeout: Duration,
}

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `query` under `limit`. An elapsed deadline becomes a storage error,
/// which the synthesizer retries like any other storage failure.
async fn within<T, F>(limit: Duration, what: &str, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ActivatorError::Storage(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out after {}ms", what, limit.as_millis()),
        )))),
    }
}

impl MySqlCatalog {
    /// Build a lazily connecting pool; nothing touches the network until the
    /// first query.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.name);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_lazy_with(options);

        info!(host = %config.host, database = %config.name, "catalog pool configured");
        Self {
            pool,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }

    /// Create a catalog from an existing connection pool
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Get the connection pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl RemoteCatalog for MySqlCatalog {
    #[instrument(skip(self))]
    async fn get_advisor(&self, email: &str) -> Result<Option<Advisor>> {
        let row = within(self.query_timeout, "advisor lookup", async {
            // The connection goes back to the pool when `conn` drops, on every path
            let mut conn = self.pool.acquire().await?;
            sqlx::query(
                r#"
                SELECT CAST(id AS SIGNED) AS id, email
                FROM users
                WHERE email = ?
                LIMIT 1
                "#,
            )
            .bind(email)
            .fetch_optional(&mut *conn)
            .await
        })
        .await?;

        row.map(|r| {
            Ok(Advisor {
                id: r.try_get("id")?,
                email: r.try_get("email")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn get_ex_api_link(&self, advisor_id: i64, service: &str) -> Result<Option<ExApiLink>> {
        let row = within(self.query_timeout, "integration link lookup", async {
            let mut conn = self.pool.acquire().await?;
            sqlx::query(
                r#"
                SELECT CAST(id AS SIGNED) AS id, CAST(user_id AS SIGNED) AS user_id, service,
                       CAST(data AS CHAR) AS data
                FROM ex_api_links
                WHERE user_id = ? AND service = ?
                LIMIT 1
                "#,
            )
            .bind(advisor_id)
            .bind(service)
            .fetch_optional(&mut *conn)
            .await
        })
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: Option<String> = row.try_get("data")?;
        let data = match raw.as_deref() {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(text).map_err(|e| {
                ActivatorError::Data(format!(
                    "ex_api_links.data for advisor {} is not valid JSON: {}",
                    advisor_id, e
                ))
            })?,
            _ => serde_json::Value::Null,
        };

        Ok(Some(ExApiLink {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            service: row.try_get("service")?,
            data,
        }))
    }

    #[instrument(skip(self))]
    async fn sample_securities(&self, count: usize) -> Result<Vec<SampledSecurity>> {
        let rows = within(self.query_timeout, "security sample", async {
            let mut conn = self.pool.acquire().await?;
            sqlx::query(
                r#"
                SELECT CAST(id AS SIGNED) AS sec_id,
                       FLOOR(RAND() * (10000 - 1000) + 1000) AS amount
                FROM pricedata_statistics
                WHERE type IN ('stock', 'fund', 'etf')
                ORDER BY RAND()
                LIMIT ?
                "#,
            )
            .bind(count as u64)
            .fetch_all(&mut *conn)
            .await
        })
        .await?;

        let securities = rows
            .iter()
            .map(|r| {
                Ok(SampledSecurity {
                    sec_id: r.try_get("sec_id")?,
                    amount: r.try_get("amount")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        debug!(requested = count, returned = securities.len(), "sampled securities");
        Ok(securities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hung_query_becomes_storage_timeout() {
        let err = within(
            Duration::from_millis(10),
            "security sample",
            std::future::pending::<std::result::Result<(), sqlx::Error>>(),
        )
        .await
        .unwrap_err();

        assert!(err.is_storage(), "got {err:?}");
        assert!(err.to_string().contains("security sample timed out"));
    }

    #[tokio::test]
    async fn finished_query_passes_through() {
        let rows = within(Duration::from_secs(1), "advisor lookup", async {
            Ok::<_, sqlx::Error>(vec![1, 2])
        })
        .await
        .unwrap();
        assert_eq!(rows, vec![1, 2]);

        let err = within(Duration::from_secs(1), "advisor lookup", async {
            Err::<(), _>(sqlx::Error::RowNotFound)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ActivatorError::Storage(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn lazy_catalog_uses_configured_query_timeout() {
        let config = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
            name: "riskalyze_adam".to_string(),
            max_connections: 1,
            acquire_timeout_ms: 100,
            query_timeout_ms: 250,
        };
        let catalog = MySqlCatalog::connect_lazy(&config);
        assert_eq!(catalog.query_timeout, Duration::from_millis(250));

        let catalog = catalog.with_query_timeout(Duration::from_millis(5));
        assert_eq!(catalog.query_timeout, Duration::from_millis(5));
    }
}
