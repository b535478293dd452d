use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

/// A premium freight order awaiting multi-level approval.
///
/// `required_auth_level` is derived from the EUR-normalized cost at creation
/// and may only change through the edit workflow. Approval progress lives in
/// the order's ledger row, not here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreightOrder {
    pub id: OrderId,
    pub plant: String,
    pub description: String,
    pub cost_amount: Decimal,
    pub cost_currency: String,
    pub cost_eur: Decimal,
    pub required_auth_level: u8,
    pub created_by: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FreightOrder {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::Approved)
                | (OrderStatus::Pending, OrderStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(TransitionError::TerminalState { status: self.status })
    }
}
