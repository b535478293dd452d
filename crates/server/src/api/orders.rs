use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};
use freightgate_core::errors::ChainError;
use freightgate_core::levels::{normalize_to_eur, required_level_for_cost};
use freightgate_notify::ApprovalNotification;

use freightgate_db::repositories::{
    ApproverRepository, OrderRepository, SqlApproverRepository, SqlOrderRepository,
};

use crate::api::{ApiError, AppState};
use crate::session::require_actor;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub plant: String,
    pub description: String,
    pub cost_amount: Decimal,
    pub cost_currency: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: String,
    pub cost_eur: Decimal,
    pub required_level: u8,
    pub status: &'static str,
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;

    let plant = request.plant.trim().to_string();
    if plant.is_empty() {
        return Err(ApiError::BadRequest("plant must not be empty".to_string()));
    }
    let description = request.description.trim().to_string();
    if description.is_empty() {
        return Err(ApiError::BadRequest("description must not be empty".to_string()));
    }
    if let Some(actor_plant) = actor.plant.as_deref().filter(|p| !p.is_empty()) {
        if actor_plant != plant {
            return Err(ApiError::Forbidden(format!(
                "session is scoped to plant `{actor_plant}`, cannot create orders for `{plant}`"
            )));
        }
    }

    let cost_eur = normalize_to_eur(request.cost_amount, &request.cost_currency, &state.rates)?;
    let required_auth_level = required_level_for_cost(cost_eur)?.get();

    // An order that could never clear its chain is refused up front.
    let approvers = SqlApproverRepository::new(state.db_pool.clone());
    let missing = approvers.missing_levels(required_auth_level, &plant).await?;
    if !missing.is_empty() {
        return Err(ChainError::IncompleteApproverChain { plant, missing }.into());
    }

    let now = Utc::now();
    let order = FreightOrder {
        id: OrderId(format!("PF-{}", Uuid::new_v4())),
        plant,
        description,
        cost_amount: request.cost_amount,
        cost_currency: request.cost_currency.trim().to_ascii_uppercase(),
        cost_eur,
        required_auth_level,
        created_by: actor.user_id,
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    SqlOrderRepository::new(state.db_pool.clone()).create(order.clone()).await?;

    info!(
        event_name = "approval.order_created",
        order_id = %order.id,
        plant = %order.plant,
        required_level = order.required_auth_level,
        "freight order created and ledger opened"
    );

    if let Some(first_approver) = approvers.resolve(1, &order.plant).await? {
        state
            .send_notification(ApprovalNotification::ApprovalNeeded {
                order_id: order.id.clone(),
                level: 1,
                recipient: first_approver.email,
            })
            .await;
    }

    Ok(Json(CreateOrderResponse {
        success: true,
        order_id: order.id.0,
        cost_eur,
        required_level: order.required_auth_level,
        status: "pending",
    }))
}
