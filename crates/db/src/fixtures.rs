use chrono::Utc;
use rust_decimal::Decimal;

use freightgate_core::domain::approver::{ApprovalLevel, Approver};
use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};

use crate::repositories::{
    ApproverRepository, OrderRepository, RepositoryError, SessionRecord, SessionRepository,
    SqlApproverRepository, SqlOrderRepository, SqlSessionRepository,
};
use crate::DbPool;

const DEMO_PLANT: &str = "3310";

/// (user id, level, plant). Levels 1-5 are plant-bound, 6-8 regional.
const DEMO_APPROVERS: &[(&str, u8, Option<&str>)] = &[
    ("u-1001", 1, Some(DEMO_PLANT)),
    ("u-1002", 2, Some(DEMO_PLANT)),
    ("u-1003", 3, Some(DEMO_PLANT)),
    ("u-1004", 4, Some(DEMO_PLANT)),
    ("u-1005", 5, Some(DEMO_PLANT)),
    ("u-1006", 6, None),
    ("u-1007", 7, None),
    ("u-1008", 8, None),
];

#[derive(Debug)]
pub struct SeedResult {
    pub approvers: usize,
    pub sessions: usize,
    pub orders: usize,
}

/// Deterministic development dataset: a full approver chain for one plant,
/// a bearer session per actor, and one pending order waiting on level 1.
/// Idempotent; safe to run against an already-seeded database.
pub async fn seed_demo_data(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let approver_repo = SqlApproverRepository::new(pool.clone());
    let session_repo = SqlSessionRepository::new(pool.clone());
    let order_repo = SqlOrderRepository::new(pool.clone());
    let now = Utc::now();

    for (user_id, level, plant) in DEMO_APPROVERS {
        let level = ApprovalLevel::new(*level)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        approver_repo
            .save(Approver {
                user_id: (*user_id).to_string(),
                name: format!("{} ({})", level.role_name(), user_id),
                email: format!("{user_id}@freightgate.test"),
                level,
                plant: plant.map(str::to_string),
            })
            .await?;

        session_repo
            .save(SessionRecord {
                token: format!("dev-level-{}", level.get()),
                user_id: (*user_id).to_string(),
                authorization_level: level.get(),
                plant: plant.map(str::to_string),
                created_at: now,
                expires_at: None,
            })
            .await?;
    }

    // Creators hold level 0: they can request edits but never approve.
    session_repo
        .save(SessionRecord {
            token: "dev-creator".to_string(),
            user_id: "u-2001".to_string(),
            authorization_level: 0,
            plant: Some(DEMO_PLANT.to_string()),
            created_at: now,
            expires_at: None,
        })
        .await?;

    let demo_order = FreightOrder {
        id: OrderId("PF-2026-0001".to_string()),
        plant: DEMO_PLANT.to_string(),
        description: "air charter, line-down stamping press parts".to_string(),
        cost_amount: Decimal::new(200_000, 2),
        cost_currency: "EUR".to_string(),
        cost_eur: Decimal::new(200_000, 2),
        required_auth_level: 6,
        created_by: "u-2001".to_string(),
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let orders = match order_repo.create(demo_order).await {
        Ok(()) => 1,
        Err(RepositoryError::Conflict(_)) => 0,
        Err(other) => return Err(other),
    };

    Ok(SeedResult {
        approvers: DEMO_APPROVERS.len(),
        sessions: DEMO_APPROVERS.len() + 1,
        orders,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::seed_demo_data;
    use crate::repositories::{ApproverRepository, SessionRepository};
    use crate::repositories::{SqlApproverRepository, SqlSessionRepository};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_is_idempotent_and_covers_the_whole_chain() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = seed_demo_data(&pool).await.expect("first seed");
        assert_eq!(first.approvers, 8);
        assert_eq!(first.orders, 1);

        let second = seed_demo_data(&pool).await.expect("second seed");
        assert_eq!(second.orders, 0);

        let approvers = SqlApproverRepository::new(pool.clone());
        assert!(approvers.missing_levels(8, "3310").await.expect("chain").is_empty());

        let sessions = SqlSessionRepository::new(pool);
        let creator = sessions
            .find_valid("dev-creator", Utc::now())
            .await
            .expect("find")
            .expect("creator session");
        assert_eq!(creator.authorization_level, 0);
    }
}
