use thiserror::Error;

use crate::domain::order::OrderStatus;

/// Longest rejection reason the ledger accepts.
pub const MAX_REJECTION_REASON_LEN: usize = 999;

/// Refusals from the approval state machine. All detected before any
/// mutation; callers see the order unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("approver plant `{approver_plant}` does not match order plant `{order_plant}`")]
    CrossPlantForbidden { approver_plant: String, order_plant: String },
    #[error("approval level {actual} is out of turn; the order is waiting on level {expected}")]
    OutOfSequence { expected: u8, actual: u8 },
    #[error("order already reached its required approval level {required_auth_level}")]
    AlreadyFullyApproved { required_auth_level: u8 },
    #[error("rejection reason {0}")]
    InvalidRejectionReason(&'static str),
    #[error("order is already in terminal status {status:?}")]
    TerminalState { status: OrderStatus },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("approval level {level} is outside the 1..=8 hierarchy")]
    OutOfRange { level: u8 },
    #[error("cost must be non-negative, got {amount}")]
    NegativeCost { amount: rust_decimal::Decimal },
    #[error("no conversion rate configured for currency `{currency}`")]
    UnknownCurrency { currency: String },
}

/// Approver-chain resolution failures. Distinct from "no pending approver":
/// a gap means the order could never clear its chain and must be surfaced,
/// not silently stalled.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("no approver found for level {level} and plant `{plant}`")]
    NotFound { level: u8, plant: String },
    #[error("approver chain for plant `{plant}` is incomplete: missing levels {missing:?}")]
    IncompleteApproverChain { plant: String, missing: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::{ChainError, TransitionError};

    #[test]
    fn errors_render_actionable_messages() {
        let error = TransitionError::OutOfSequence { expected: 3, actual: 5 };
        assert_eq!(
            error.to_string(),
            "approval level 5 is out of turn; the order is waiting on level 3"
        );

        let error =
            ChainError::IncompleteApproverChain { plant: "3310".to_string(), missing: vec![4, 7] };
        assert!(error.to_string().contains("missing levels [4, 7]"));
    }
}
