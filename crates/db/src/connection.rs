use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use freightgate_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open the pool described by `config`. Every connection gets the sqlite
/// pragmas the approval ledger relies on: foreign keys for the order/ledger
/// parent rows, WAL so queue reads do not block approvals, and a busy
/// timeout sized from the config.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = config.busy_timeout_ms.max(1);
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}

/// Shorthand for tests and tools that only care about the url and pool shape.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    connect(&DatabaseConfig {
        url: database_url.to_string(),
        max_connections,
        timeout_secs,
        busy_timeout_ms: 5_000,
    })
    .await
}

#[cfg(test)]
mod tests {
    use freightgate_core::config::DatabaseConfig;

    use super::{connect, connect_with_settings};

    #[tokio::test]
    async fn busy_timeout_pragma_follows_the_config() {
        let pool = connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
            busy_timeout_ms: 1_234,
        })
        .await
        .expect("connect");

        let timeout: i64 =
            sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(timeout, 1_234);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced_on_every_connection() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let enabled: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(enabled, 1);
    }
}
