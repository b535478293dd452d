use serde::{Deserialize, Serialize};

use crate::domain::ledger::{ApprovalState, HistoryAction, REJECTED_SENTINEL};
use crate::domain::order::{FreightOrder, OrderStatus};
use crate::errors::{TransitionError, MAX_REJECTION_REASON_LEN};

/// The acting user, passed explicitly into every state-machine call instead
/// of living in ambient session state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: String,
    pub authorization_level: u8,
    /// Empty/absent means a regional actor with no plant restriction.
    pub plant: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject { reason: String },
}

/// A validated transition, ready for the ledger to persist atomically.
///
/// `expected_act_approv` is the progress value every check was evaluated
/// against; the ledger re-asserts it inside the write transaction so two
/// concurrent attempts at the same rung cannot both commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTransition {
    pub acting_user: String,
    pub level: u8,
    pub action: HistoryAction,
    pub expected_act_approv: i64,
    pub new_act_approv: i64,
    pub rejection_reason: Option<String>,
    pub resulting_state: ApprovalState,
    pub new_order_status: Option<OrderStatus>,
}

impl PlannedTransition {
    pub fn is_terminal(&self) -> bool {
        self.resulting_state.is_terminal()
    }
}

/// Validate one approve/reject attempt against the order and its current
/// ledger state. Checks run in a fixed order: plant scoping, terminal-state
/// and sequencing, rejection-reason validity. Nothing is mutated here.
pub fn plan_transition(
    actor: &ActorContext,
    order: &FreightOrder,
    current: ApprovalState,
    action: &ApprovalAction,
) -> Result<PlannedTransition, TransitionError> {
    if let Some(actor_plant) = actor.plant.as_deref().filter(|plant| !plant.is_empty()) {
        if actor_plant != order.plant {
            return Err(TransitionError::CrossPlantForbidden {
                approver_plant: actor_plant.to_string(),
                order_plant: order.plant.clone(),
            });
        }
    }

    let reached = match current {
        ApprovalState::Rejected => {
            return Err(TransitionError::TerminalState { status: OrderStatus::Rejected })
        }
        ApprovalState::Approved => {
            return Err(match action {
                ApprovalAction::Approve => TransitionError::AlreadyFullyApproved {
                    required_auth_level: order.required_auth_level,
                },
                ApprovalAction::Reject { .. } => {
                    TransitionError::TerminalState { status: OrderStatus::Approved }
                }
            })
        }
        ApprovalState::Pending { reached } => reached,
    };

    let expected = reached + 1;
    if actor.authorization_level != expected {
        return Err(TransitionError::OutOfSequence {
            expected,
            actual: actor.authorization_level,
        });
    }

    match action {
        ApprovalAction::Reject { reason } => {
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(TransitionError::InvalidRejectionReason("must not be empty"));
            }
            if reason.chars().count() > MAX_REJECTION_REASON_LEN {
                return Err(TransitionError::InvalidRejectionReason(
                    "exceeds the 999 character bound",
                ));
            }

            Ok(PlannedTransition {
                acting_user: actor.user_id.clone(),
                level: expected,
                action: HistoryAction::Rejected,
                expected_act_approv: i64::from(reached),
                new_act_approv: REJECTED_SENTINEL,
                rejection_reason: Some(reason.to_string()),
                resulting_state: ApprovalState::Rejected,
                new_order_status: Some(OrderStatus::Rejected),
            })
        }
        ApprovalAction::Approve => {
            let resulting_state = if expected >= order.required_auth_level {
                ApprovalState::Approved
            } else {
                ApprovalState::Pending { reached: expected }
            };
            let new_order_status =
                (resulting_state == ApprovalState::Approved).then_some(OrderStatus::Approved);

            Ok(PlannedTransition {
                acting_user: actor.user_id.clone(),
                level: expected,
                action: HistoryAction::Approved,
                expected_act_approv: i64::from(reached),
                new_act_approv: i64::from(expected),
                rejection_reason: None,
                resulting_state,
                new_order_status,
            })
        }
    }
}
