use std::collections::HashMap;

use crate::domain::approver::{ApprovalLevel, Approver};
use crate::errors::ChainError;

/// Read-only lookup of who holds an approval rung for a plant.
///
/// Resolution matches an exact level AND either an exact plant or a regional
/// (plant-less) assignment, preferring the plant-specific approver when both
/// exist.
pub trait ApproverDirectory {
    fn resolve(&self, level: ApprovalLevel, plant: &str) -> Result<Approver, ChainError>;
}

/// Levels from 1 to `required_auth_level` that do not resolve for the plant.
/// A gap is a configuration error, not an empty queue; an empty result means
/// the chain is fully staffed.
pub fn chain_gaps<D: ApproverDirectory + ?Sized>(
    directory: &D,
    required_auth_level: u8,
    plant: &str,
) -> Vec<u8> {
    (1..=required_auth_level)
        .filter(|&level| {
            ApprovalLevel::new(level)
                .map(|level| directory.resolve(level, plant).is_err())
                .unwrap_or(true)
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryApproverDirectory {
    by_level: HashMap<u8, Vec<Approver>>,
}

impl InMemoryApproverDirectory {
    pub fn new(approvers: Vec<Approver>) -> Self {
        let mut by_level: HashMap<u8, Vec<Approver>> = HashMap::new();
        for approver in approvers {
            by_level.entry(approver.level.get()).or_default().push(approver);
        }
        // Plant-specific rows sort before regional ones.
        for entries in by_level.values_mut() {
            entries.sort_by(|left, right| match (&left.plant, &right.plant) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => left.user_id.cmp(&right.user_id),
            });
        }
        Self { by_level }
    }
}

impl ApproverDirectory for InMemoryApproverDirectory {
    fn resolve(&self, level: ApprovalLevel, plant: &str) -> Result<Approver, ChainError> {
        self.by_level
            .get(&level.get())
            .and_then(|entries| {
                entries.iter().find(|approver| match &approver.plant {
                    Some(own) => own == plant,
                    None => true,
                })
            })
            .cloned()
            .ok_or_else(|| ChainError::NotFound { level: level.get(), plant: plant.to_string() })
    }
}
