use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTokenStatus {
    /// Requested, waiting for the reviewing role to release it.
    Issued,
    /// Released for editing; a single submission may consume it.
    Released,
    /// Consumed by a submission. Terminal.
    Used,
}

/// Single-use credential allowing a submitted order to be reopened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditToken {
    pub token: String,
    pub order_id: OrderId,
    pub requested_by: String,
    pub reason: String,
    pub status: EditTokenStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EditToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable tokens are released, unexpired, and not yet consumed.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == EditTokenStatus::Released && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{EditToken, EditTokenStatus};
    use crate::domain::order::OrderId;

    fn token(status: EditTokenStatus, ttl_hours: i64) -> EditToken {
        let now = Utc::now();
        EditToken {
            token: "tok-1".to_string(),
            order_id: OrderId("PF-1".to_string()),
            requested_by: "u-creator".to_string(),
            reason: "wrong carrier quoted".to_string(),
            status,
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        }
    }

    #[test]
    fn only_released_tokens_are_usable() {
        let now = Utc::now();
        assert!(!token(EditTokenStatus::Issued, 24).is_usable(now));
        assert!(token(EditTokenStatus::Released, 24).is_usable(now));
        assert!(!token(EditTokenStatus::Used, 24).is_usable(now));
    }

    #[test]
    fn expired_tokens_are_unusable_even_when_released() {
        let now = Utc::now();
        assert!(!token(EditTokenStatus::Released, -1).is_usable(now));
    }
}
