use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightgate_core::domain::approver::ApprovalLevel;
use freightgate_core::domain::ledger::{ApprovalState, HistoryAction};
use freightgate_core::domain::order::{OrderId, OrderStatus};
use freightgate_db::repositories::{
    ApproverRepository, LedgerRepository, OrderRepository, SqlApproverRepository,
    SqlLedgerRepository, SqlOrderRepository,
};

use crate::api::{ApiError, AppState};
use crate::session::require_actor;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub success: bool,
    pub order_id: String,
    pub created_by: String,
    pub status: OrderStatus,
    pub required_level: u8,
    pub act_approv: i64,
    pub state: ApprovalState,
    pub next_level: Option<u8>,
    pub progress_percent: u8,
    pub rejection_reason: Option<String>,
    pub levels: Vec<LevelEntry>,
    pub history: Vec<HistoryEntry>,
}

/// One rung of the chain, annotated for timeline rendering.
#[derive(Debug, Serialize)]
pub struct LevelEntry {
    pub level: u8,
    pub role: &'static str,
    pub approver: Option<LevelApprover>,
    pub completed: bool,
    pub current: bool,
    pub rejected_here: bool,
}

#[derive(Debug, Serialize)]
pub struct LevelApprover {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub acting_user: String,
    pub action: HistoryAction,
    pub level: u8,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub async fn order_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressResponse>, ApiError> {
    require_actor(&state.db_pool, &headers).await?;

    let order_id = OrderId(query.order_id);
    let order = SqlOrderRepository::new(state.db_pool.clone())
        .find_by_id(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} does not exist")))?;

    let ledger = SqlLedgerRepository::new(state.db_pool.clone());
    let snapshot = ledger
        .snapshot(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} has no approval ledger")))?;

    let approval_state = ApprovalState::from_wire(snapshot.act_approv, order.required_auth_level);
    let history = ledger.history(&order_id).await?;

    // A rejected order's reached progress is not in the wire value (99), so
    // it is reconstructed from the approval records.
    let reached = match approval_state {
        ApprovalState::Pending { reached } => reached,
        ApprovalState::Approved => order.required_auth_level,
        ApprovalState::Rejected => history
            .iter()
            .filter(|record| record.action == HistoryAction::Approved)
            .map(|record| record.level)
            .max()
            .unwrap_or(0),
    };
    let rejected_level = match approval_state {
        ApprovalState::Rejected => history
            .iter()
            .rev()
            .find(|record| record.action == HistoryAction::Rejected)
            .map(|record| record.level),
        _ => None,
    };
    let next_level = approval_state.next_level(order.required_auth_level);

    let approvers = SqlApproverRepository::new(state.db_pool.clone());
    let mut levels = Vec::with_capacity(usize::from(order.required_auth_level));
    for level in 1..=order.required_auth_level {
        let rung = ApprovalLevel::new(level).map_err(|e| ApiError::Internal(e.to_string()))?;
        let approver = approvers.resolve(level, &order.plant).await?.map(|found| LevelApprover {
            user_id: found.user_id,
            name: found.name,
            email: found.email,
        });
        levels.push(LevelEntry {
            level,
            role: rung.role_name(),
            approver,
            completed: level <= reached,
            current: next_level == Some(level),
            rejected_here: rejected_level == Some(level),
        });
    }

    // A rejection counts through the level that made it, not just the
    // approvals collected before it.
    let progress_position = rejected_level.unwrap_or(reached);
    let progress_percent = if order.required_auth_level == 0 {
        100
    } else {
        ((u16::from(progress_position) * 100) / u16::from(order.required_auth_level)) as u8
    };

    Ok(Json(ProgressResponse {
        success: true,
        order_id: order.id.0,
        created_by: order.created_by,
        status: order.status,
        required_level: order.required_auth_level,
        act_approv: snapshot.act_approv,
        state: approval_state,
        next_level,
        progress_percent,
        rejection_reason: snapshot.rejection_reason,
        levels,
        history: history
            .into_iter()
            .map(|record| HistoryEntry {
                acting_user: record.acting_user,
                action: record.action,
                level: record.level,
                comment: record.comment,
                recorded_at: record.recorded_at,
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
    use freightgate_core::domain::approver::{ApprovalLevel, Approver};
    use freightgate_core::domain::ledger::ApprovalState;
    use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};
    use freightgate_core::levels::CurrencyRates;
    use freightgate_core::machine::{plan_transition, ActorContext, ApprovalAction};
    use freightgate_db::repositories::{
        ApproverRepository, LedgerRepository, OrderRepository, SessionRecord, SessionRepository,
        SqlApproverRepository, SqlLedgerRepository, SqlOrderRepository, SqlSessionRepository,
    };
    use freightgate_db::{connect_with_settings, migrations};
    use freightgate_notify::RecordingNotifier;

    use super::{order_progress, ProgressQuery};
    use crate::api::{ApiError, AppState};

    async fn setup() -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let approvers = SqlApproverRepository::new(pool.clone());
        for level in 1..=8u8 {
            approvers
                .save(Approver {
                    user_id: format!("u-10{level:02}"),
                    name: format!("Approver {level}"),
                    email: format!("approver{level}@freightgate.test"),
                    level: ApprovalLevel::new(level).expect("level"),
                    plant: None,
                })
                .await
                .expect("approver");
        }

        SqlSessionRepository::new(pool.clone())
            .save(SessionRecord {
                token: "tok-viewer".to_string(),
                user_id: "u-9001".to_string(),
                authorization_level: 0,
                plant: Some("3310".to_string()),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .expect("session");

        AppState {
            db_pool: pool,
            rates: CurrencyRates::default(),
            edit_token_ttl_hours: 72,
            notifier: Arc::new(RecordingNotifier::default()),
            audit: Arc::new(InMemoryAuditSink::default()),
        }
    }

    fn auth() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-viewer"));
        headers
    }

    async fn seed_order(state: &AppState, required: u8) -> FreightOrder {
        let now = Utc::now();
        let order = FreightOrder {
            id: OrderId("PF-8001".to_string()),
            plant: "3310".to_string(),
            description: "air charter".to_string(),
            cost_amount: Decimal::new(120_000, 2),
            cost_currency: "EUR".to_string(),
            cost_eur: Decimal::new(120_000, 2),
            required_auth_level: required,
            created_by: "u-2001".to_string(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        SqlOrderRepository::new(state.db_pool.clone()).create(order.clone()).await.expect("order");
        order
    }

    async fn act(state: &AppState, order: &FreightOrder, level: u8, action: ApprovalAction) {
        let ledger = SqlLedgerRepository::new(state.db_pool.clone());
        let snapshot =
            ledger.snapshot(&order.id).await.expect("snapshot").expect("ledger row");
        let current = ApprovalState::from_wire(snapshot.act_approv, order.required_auth_level);
        let actor = ActorContext {
            user_id: format!("u-10{level:02}"),
            authorization_level: level,
            plant: None,
        };
        let planned = plan_transition(&actor, order, current, &action).expect("plan");
        ledger.advance(order, &planned, Utc::now()).await.expect("advance");
    }

    #[tokio::test]
    async fn progress_reflects_partial_approval_and_history() {
        let state = setup().await;
        let order = seed_order(&state, 5).await;
        act(&state, &order, 1, ApprovalAction::Approve).await;
        act(&state, &order, 2, ApprovalAction::Approve).await;

        let Json(response) = order_progress(
            State(state),
            auth(),
            Query(ProgressQuery { order_id: order.id.0.clone() }),
        )
        .await
        .expect("progress");

        assert!(response.success);
        assert_eq!(response.created_by, "u-2001");
        assert_eq!(response.act_approv, 2);
        assert_eq!(response.state, ApprovalState::Pending { reached: 2 });
        assert_eq!(response.next_level, Some(3));
        assert_eq!(response.progress_percent, 40);
        assert_eq!(response.history.len(), 2);
        assert_eq!(response.history[1].acting_user, "u-1002");

        assert_eq!(response.levels.len(), 5);
        assert!(response.levels[0].completed);
        assert!(response.levels[1].completed);
        assert!(!response.levels[2].completed);
        assert!(response.levels[2].current);
        assert_eq!(response.levels[0].role, "Traffic");
        assert_eq!(
            response.levels[2].approver.as_ref().map(|a| a.user_id.as_str()),
            Some("u-1003")
        );
    }

    #[tokio::test]
    async fn untouched_orders_report_level_one_as_next() {
        let state = setup().await;
        let order = seed_order(&state, 7).await;

        let Json(response) = order_progress(
            State(state),
            auth(),
            Query(ProgressQuery { order_id: order.id.0 }),
        )
        .await
        .expect("progress");

        assert_eq!(response.act_approv, 0);
        assert_eq!(response.next_level, Some(1));
        assert_eq!(response.progress_percent, 0);
        assert!(response.history.is_empty());
        assert!(response.rejection_reason.is_none());
        assert!(response.levels.iter().all(|entry| !entry.completed));
    }

    #[tokio::test]
    async fn a_rejection_is_pinned_to_the_level_that_made_it() {
        let state = setup().await;
        let order = seed_order(&state, 5).await;
        act(&state, &order, 1, ApprovalAction::Approve).await;
        act(&state, &order, 2, ApprovalAction::Approve).await;
        act(
            &state,
            &order,
            3,
            ApprovalAction::Reject { reason: "quote does not match invoice".to_string() },
        )
        .await;

        let Json(response) = order_progress(
            State(state),
            auth(),
            Query(ProgressQuery { order_id: order.id.0 }),
        )
        .await
        .expect("progress");

        assert_eq!(response.state, ApprovalState::Rejected);
        assert_eq!(response.next_level, None);
        // Three of five levels acted on the order: two approvals, one rejection.
        assert_eq!(response.progress_percent, 60);
        assert_eq!(response.rejection_reason.as_deref(), Some("quote does not match invoice"));
        assert!(response.levels[1].completed);
        assert!(response.levels[2].rejected_here);
        assert!(!response.levels[2].completed);
    }

    #[tokio::test]
    async fn unknown_orders_are_not_found() {
        let state = setup().await;

        let err = order_progress(
            State(state),
            auth(),
            Query(ProgressQuery { order_id: "PF-nope".to_string() }),
        )
        .await
        .expect_err("missing order");
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
