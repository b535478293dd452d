use axum::http::{header, HeaderMap};
use chrono::Utc;

use freightgate_core::machine::ActorContext;
use freightgate_db::repositories::{SessionRepository, SqlSessionRepository};
use freightgate_db::DbPool;

use crate::api::ApiError;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller's session into an explicit actor. Every approval
/// decision downstream takes this context as an argument; nothing reads
/// ambient session state.
pub async fn require_actor(pool: &DbPool, headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    let token =
        bearer_token(headers).ok_or(ApiError::Unauthorized("missing bearer token"))?;

    let session = SqlSessionRepository::new(pool.clone())
        .find_valid(token, Utc::now())
        .await?
        .ok_or(ApiError::Unauthorized("unknown or expired session"))?;

    Ok(ActorContext {
        user_id: session.user_id,
        authorization_level: session.authorization_level,
        plant: session.plant,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue};
    use chrono::Utc;

    use freightgate_db::repositories::{SessionRecord, SessionRepository, SqlSessionRepository};
    use freightgate_db::{connect_with_settings, migrations};

    use super::{bearer_token, require_actor};
    use crate::api::ApiError;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn bearer_token_requires_the_scheme_prefix() {
        assert_eq!(bearer_token(&headers_with("Bearer tok-1")), Some("tok-1"));
        assert_eq!(bearer_token(&headers_with("Basic tok-1")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn require_actor_maps_a_valid_session() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SqlSessionRepository::new(pool.clone())
            .save(SessionRecord {
                token: "tok-3".to_string(),
                user_id: "u-1003".to_string(),
                authorization_level: 3,
                plant: Some("3310".to_string()),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .expect("save session");

        let actor = require_actor(&pool, &headers_with("Bearer tok-3")).await.expect("actor");
        assert_eq!(actor.user_id, "u-1003");
        assert_eq!(actor.authorization_level, 3);
        assert_eq!(actor.plant.as_deref(), Some("3310"));
    }

    #[tokio::test]
    async fn require_actor_rejects_unknown_tokens() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let err = require_actor(&pool, &headers_with("Bearer nope")).await.expect_err("reject");
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
