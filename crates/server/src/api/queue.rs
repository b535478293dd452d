use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freightgate_db::repositories::{OrderRepository, QueueFilter, SqlOrderRepository};

use crate::api::{ApiError, AppState};
use crate::session::require_actor;

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub approval_level: Option<u8>,
    pub plant: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub success: bool,
    pub approval_level: u8,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub entries: Vec<QueueItem>,
}

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub order_id: String,
    pub plant: String,
    pub description: String,
    pub cost_eur: Decimal,
    pub required_level: u8,
    pub act_approv: i64,
}

/// Orders waiting on the caller's own level. A session may ask for a
/// different level explicitly, but only its own is ever granted.
pub async fn approval_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;

    let level = query.approval_level.unwrap_or(actor.authorization_level);
    if level != actor.authorization_level {
        return Err(ApiError::Forbidden(format!(
            "session holds level {}, cannot read the level {} queue",
            actor.authorization_level, level
        )));
    }
    if level == 0 {
        return Err(ApiError::Forbidden(
            "the caller holds no approval level".to_string(),
        ));
    }

    // Plant-scoped sessions only ever see their own plant.
    let plant = match actor.plant.as_deref().filter(|plant| !plant.is_empty()) {
        Some(own) => Some(own.to_string()),
        None => query.plant.filter(|plant| !plant.trim().is_empty()),
    };

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let filter = QueueFilter {
        approval_level: level,
        plant,
        search: query.search.filter(|term| !term.trim().is_empty()),
        page,
        limit,
    };
    let result = SqlOrderRepository::new(state.db_pool.clone()).list_queue(&filter).await?;

    Ok(Json(QueueResponse {
        success: true,
        approval_level: level,
        page: result.page,
        limit: result.limit,
        total: result.total,
        entries: result
            .entries
            .into_iter()
            .map(|entry| QueueItem {
                order_id: entry.order.id.0,
                plant: entry.order.plant,
                description: entry.order.description,
                cost_eur: entry.order.cost_eur,
                required_level: entry.order.required_auth_level,
                act_approv: entry.act_approv,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::{header, HeaderMap, HeaderValue};
    use axum::Json;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use freightgate_core::audit::InMemoryAuditSink;
    use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};
    use freightgate_core::levels::CurrencyRates;
    use freightgate_db::repositories::{
        OrderRepository, SessionRecord, SessionRepository, SqlOrderRepository,
        SqlSessionRepository,
    };
    use freightgate_db::{connect_with_settings, migrations};
    use freightgate_notify::RecordingNotifier;

    use super::{approval_queue, QueueQuery};
    use crate::api::{ApiError, AppState};

    async fn setup() -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        AppState {
            db_pool: pool,
            rates: CurrencyRates::default(),
            edit_token_ttl_hours: 72,
            notifier: Arc::new(RecordingNotifier::default()),
            audit: Arc::new(InMemoryAuditSink::default()),
        }
    }

    async fn seed_session(state: &AppState, token: &str, level: u8, plant: Option<&str>) {
        SqlSessionRepository::new(state.db_pool.clone())
            .save(SessionRecord {
                token: token.to_string(),
                user_id: format!("u-{token}"),
                authorization_level: level,
                plant: plant.map(str::to_string),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .expect("session");
    }

    async fn seed_order(state: &AppState, id: &str, plant: &str) {
        let now = Utc::now();
        SqlOrderRepository::new(state.db_pool.clone())
            .create(FreightOrder {
                id: OrderId(id.to_string()),
                plant: plant.to_string(),
                description: "urgent freight".to_string(),
                cost_amount: Decimal::new(50_000, 2),
                cost_currency: "EUR".to_string(),
                cost_eur: Decimal::new(50_000, 2),
                required_auth_level: 5,
                created_by: "u-2001".to_string(),
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("order");
    }

    fn auth(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    #[tokio::test]
    async fn the_queue_defaults_to_the_callers_level_and_plant() {
        let state = setup().await;
        seed_session(&state, "tok-a", 1, Some("3310")).await;
        seed_order(&state, "PF-q1", "3310").await;
        seed_order(&state, "PF-q2", "4422").await;

        let Json(response) =
            approval_queue(State(state), auth("tok-a"), Query(QueueQuery::default()))
                .await
                .expect("queue");

        assert_eq!(response.approval_level, 1);
        assert_eq!(response.total, 1);
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.entries[0].order_id, "PF-q1");
        assert_eq!(response.entries[0].act_approv, 0);
    }

    #[tokio::test]
    async fn regional_sessions_may_narrow_by_plant() {
        let state = setup().await;
        seed_session(&state, "tok-r", 1, None).await;
        seed_order(&state, "PF-q1", "3310").await;
        seed_order(&state, "PF-q2", "4422").await;

        let Json(all) = approval_queue(
            State(state.clone()),
            auth("tok-r"),
            Query(QueueQuery::default()),
        )
        .await
        .expect("queue");
        assert_eq!(all.total, 2);

        let Json(narrowed) = approval_queue(
            State(state),
            auth("tok-r"),
            Query(QueueQuery { plant: Some("4422".to_string()), ..QueueQuery::default() }),
        )
        .await
        .expect("queue");
        assert_eq!(narrowed.total, 1);
        assert_eq!(narrowed.entries[0].order_id, "PF-q2");
    }

    #[tokio::test]
    async fn asking_for_someone_elses_level_is_forbidden() {
        let state = setup().await;
        seed_session(&state, "tok-a", 1, None).await;

        let err = approval_queue(
            State(state),
            auth("tok-a"),
            Query(QueueQuery { approval_level: Some(3), ..QueueQuery::default() }),
        )
        .await
        .expect_err("level mismatch");
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn creators_without_an_approval_level_have_no_queue() {
        let state = setup().await;
        seed_session(&state, "tok-c", 0, Some("3310")).await;

        let err = approval_queue(State(state), auth("tok-c"), Query(QueueQuery::default()))
            .await
            .expect_err("level 0");
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let state = setup().await;
        seed_session(&state, "tok-a", 1, None).await;
        seed_order(&state, "PF-q1", "3310").await;

        let Json(response) = approval_queue(
            State(state),
            auth("tok-a"),
            Query(QueueQuery { limit: Some(5000), ..QueueQuery::default() }),
        )
        .await
        .expect("queue");
        assert_eq!(response.limit, 100);
    }
}
