use serde::{Deserialize, Serialize};

use crate::errors::LevelError;

/// One rung of the fixed approver hierarchy (1..=8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalLevel(u8);

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 8;

impl ApprovalLevel {
    pub fn new(level: u8) -> Result<Self, LevelError> {
        if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            Ok(Self(level))
        } else {
            Err(LevelError::OutOfRange { level })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Domain name of the rung, matching the org chart.
    pub fn role_name(self) -> &'static str {
        match self.0 {
            1 => "Traffic",
            2 => "Transportation",
            3 => "Logistics Manager",
            4 => "Controlling",
            5 => "Plant Manager",
            6 => "Senior Manager Logistics Division",
            7 => "Manager OPS Division",
            _ => "SR VP Regional",
        }
    }
}

impl std::fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user holding one approval rung, optionally restricted to a plant.
/// `plant == None` means regional: eligible for orders from any plant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub level: ApprovalLevel,
    pub plant: Option<String>,
}

impl Approver {
    pub fn covers_plant(&self, plant: &str) -> bool {
        match &self.plant {
            Some(own) => own == plant,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalLevel, Approver};

    #[test]
    fn level_range_is_enforced() {
        assert!(ApprovalLevel::new(0).is_err());
        assert!(ApprovalLevel::new(9).is_err());
        assert_eq!(ApprovalLevel::new(5).expect("valid").get(), 5);
    }

    #[test]
    fn rung_names_match_hierarchy() {
        assert_eq!(ApprovalLevel::new(1).expect("valid").role_name(), "Traffic");
        assert_eq!(ApprovalLevel::new(8).expect("valid").role_name(), "SR VP Regional");
    }

    #[test]
    fn regional_approver_covers_every_plant() {
        let regional = Approver {
            user_id: "u-vp".to_string(),
            name: "VP".to_string(),
            email: "vp@example.com".to_string(),
            level: ApprovalLevel::new(8).expect("valid"),
            plant: None,
        };
        assert!(regional.covers_plant("3310"));
        assert!(regional.covers_plant("3330"));

        let scoped = Approver { plant: Some("3310".to_string()), ..regional };
        assert!(scoped.covers_plant("3310"));
        assert!(!scoped.covers_plant("3330"));
    }
}
