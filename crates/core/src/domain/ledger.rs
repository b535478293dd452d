use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;

/// Legacy wire value meaning "rejected". Stored data and the JSON surface
/// still use it; in-process code uses [`ApprovalState`] instead.
pub const REJECTED_SENTINEL: i64 = 99;

/// Where an order sits in its approval chain.
///
/// `Pending { reached: 0 }` is a freshly created order nobody has touched.
/// `Approved` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalState {
    Pending { reached: u8 },
    Approved,
    Rejected,
}

impl ApprovalState {
    /// Decode the stored `act_approv` integer against the order's required
    /// level. Values at or above the required level count as fully approved.
    pub fn from_wire(act_approv: i64, required_auth_level: u8) -> Self {
        if act_approv == REJECTED_SENTINEL {
            Self::Rejected
        } else if act_approv >= i64::from(required_auth_level) {
            Self::Approved
        } else {
            Self::Pending { reached: act_approv.max(0) as u8 }
        }
    }

    /// Encode back to the legacy integer.
    pub fn wire_value(self, required_auth_level: u8) -> i64 {
        match self {
            Self::Pending { reached } => i64::from(reached),
            Self::Approved => i64::from(required_auth_level),
            Self::Rejected => REJECTED_SENTINEL,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    /// The level whose approval the order is waiting on, if any.
    pub fn next_level(self, required_auth_level: u8) -> Option<u8> {
        match self {
            Self::Pending { reached } if reached < required_auth_level => Some(reached + 1),
            _ => None,
        }
    }
}

/// The one live approval row an order owns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub order_id: OrderId,
    pub act_approv: i64,
    pub acted_by: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Approved,
    Rejected,
}

/// Append-only record of one approve/reject action. Never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub order_id: OrderId,
    pub acting_user: String,
    pub action: HistoryAction,
    pub level: u8,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ApprovalState, REJECTED_SENTINEL};

    #[test]
    fn wire_roundtrip_preserves_progress() {
        let state = ApprovalState::from_wire(3, 6);
        assert_eq!(state, ApprovalState::Pending { reached: 3 });
        assert_eq!(state.wire_value(6), 3);
    }

    #[test]
    fn sentinel_decodes_to_rejected() {
        let state = ApprovalState::from_wire(REJECTED_SENTINEL, 6);
        assert_eq!(state, ApprovalState::Rejected);
        assert!(state.is_terminal());
        assert_eq!(state.wire_value(6), REJECTED_SENTINEL);
    }

    #[test]
    fn reaching_required_level_is_approved() {
        let state = ApprovalState::from_wire(6, 6);
        assert_eq!(state, ApprovalState::Approved);
        assert!(state.is_terminal());
        assert_eq!(state.next_level(6), None);
    }

    #[test]
    fn next_level_walks_the_chain() {
        assert_eq!(ApprovalState::Pending { reached: 0 }.next_level(6), Some(1));
        assert_eq!(ApprovalState::Pending { reached: 5 }.next_level(6), Some(6));
        assert_eq!(ApprovalState::Rejected.next_level(6), None);
    }

    #[test]
    fn progress_beyond_required_still_counts_as_approved() {
        // An edit can lower the ceiling below already-reached progress.
        let state = ApprovalState::from_wire(6, 5);
        assert_eq!(state, ApprovalState::Approved);
    }
}
