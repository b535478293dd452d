use chrono::{DateTime, Utc};
use sqlx::Row;

use super::order::parse_timestamp;
use super::{RepositoryError, SessionRepository};
use crate::DbPool;

/// Bearer-token session backing `ActorContext` resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub authorization_level: u8,
    pub plant: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, RepositoryError> {
    let token: String =
        row.try_get("token").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let authorization_level: i64 =
        row.try_get("authorization_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plant: Option<String> =
        row.try_get("plant").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: Option<String> =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let authorization_level = u8::try_from(authorization_level).map_err(|_| {
        RepositoryError::Decode(format!("authorization_level out of range: {authorization_level}"))
    })?;

    Ok(SessionRecord {
        token,
        user_id,
        authorization_level,
        plant,
        created_at: parse_timestamp(&created_at_str),
        expires_at: expires_at_str.as_deref().map(parse_timestamp),
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT token, user_id, authorization_level, plant, created_at, expires_at
             FROM user_session WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let session = match row {
            Some(ref r) => row_to_session(r)?,
            None => return Ok(None),
        };

        if let Some(expires_at) = session.expires_at {
            if now >= expires_at {
                return Ok(None);
            }
        }

        Ok(Some(session))
    }

    async fn save(&self, session: SessionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_session (token, user_id, authorization_level, plant, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET
                 user_id = excluded.user_id,
                 authorization_level = excluded.authorization_level,
                 plant = excluded.plant,
                 expires_at = excluded.expires_at",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(i64::from(session.authorization_level))
        .bind(&session.plant)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{SessionRecord, SqlSessionRepository};
    use crate::repositories::SessionRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn session(token: &str, expires_in_hours: Option<i64>) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            token: token.to_string(),
            user_id: "u-2001".to_string(),
            authorization_level: 3,
            plant: Some("3310".to_string()),
            created_at: now,
            expires_at: expires_in_hours.map(|hours| now + Duration::hours(hours)),
        }
    }

    #[tokio::test]
    async fn valid_sessions_resolve() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        repo.save(session("tok-ok", Some(8))).await.expect("save");

        let found = repo.find_valid("tok-ok", Utc::now()).await.expect("find").expect("session");
        assert_eq!(found.user_id, "u-2001");
        assert_eq!(found.authorization_level, 3);
    }

    #[tokio::test]
    async fn expired_and_unknown_sessions_resolve_to_none() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        repo.save(session("tok-expired", Some(1))).await.expect("save");

        let later = Utc::now() + Duration::hours(2);
        assert!(repo.find_valid("tok-expired", later).await.expect("find").is_none());
        assert!(repo.find_valid("tok-missing", Utc::now()).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn sessions_without_expiry_never_lapse() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        repo.save(session("tok-forever", None)).await.expect("save");

        let far_future = Utc::now() + Duration::days(3650);
        assert!(repo.find_valid("tok-forever", far_future).await.expect("find").is_some());
    }
}
