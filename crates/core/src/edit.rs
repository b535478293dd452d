use serde::{Deserialize, Serialize};

use crate::domain::ledger::ApprovalState;

/// Where the approval chain picks up after an edited order is resubmitted.
///
/// Resuming is never a ledger rewind for in-flight orders: `act_approv`
/// stays where it was and only the notification target and the required
/// ceiling change. The one exception is a rejected order, whose resubmission
/// restarts the chain from the bottom (the current-state row is reset, the
/// history keeps the rejection).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumePoint {
    /// Fully approved before the edit; nothing left to approve, the creator
    /// is notified of the applied changes.
    NoFurtherApproval,
    /// The chain continues at the level that was pending before the edit,
    /// against the (possibly changed) new ceiling.
    Resume { next_level: u8 },
    /// The recomputed required level fell at or below already-reached
    /// progress: the order is marked fully approved immediately and the
    /// creator is notified. `act_approv` is left untouched.
    CeilingLowered,
    /// The order had been rejected; resubmission re-enters the chain at
    /// level 1.
    RestartChain,
}

/// Decide the resume point from the pre-edit ledger value and the required
/// levels before and after the edit.
pub fn resolve_resume_point(
    act_approv_before: i64,
    required_before: u8,
    required_after: u8,
) -> ResumePoint {
    match ApprovalState::from_wire(act_approv_before, required_before) {
        ApprovalState::Rejected => ResumePoint::RestartChain,
        ApprovalState::Approved => ResumePoint::NoFurtherApproval,
        ApprovalState::Pending { reached } => {
            if required_after > reached {
                ResumePoint::Resume { next_level: reached + 1 }
            } else {
                ResumePoint::CeilingLowered
            }
        }
    }
}
