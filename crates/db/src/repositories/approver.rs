use sqlx::Row;

use freightgate_core::domain::approver::{ApprovalLevel, Approver};
use freightgate_core::{chain_gaps, InMemoryApproverDirectory};

use super::{ApproverRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApproverRepository {
    pool: DbPool,
}

impl SqlApproverRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_approver(row: &sqlx::sqlite::SqliteRow) -> Result<Approver, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level: i64 = row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plant: Option<String> =
        row.try_get("plant").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let level = u8::try_from(level)
        .ok()
        .and_then(|level| ApprovalLevel::new(level).ok())
        .ok_or_else(|| RepositoryError::Decode(format!("approver level out of range: {level}")))?;

    Ok(Approver { user_id, name, email, level, plant })
}

#[async_trait::async_trait]
impl ApproverRepository for SqlApproverRepository {
    async fn resolve(
        &self,
        level: u8,
        plant: &str,
    ) -> Result<Option<Approver>, RepositoryError> {
        // Plant-specific approvers outrank regional (NULL plant) ones.
        let row = sqlx::query(
            "SELECT user_id, name, email, level, plant
             FROM approver
             WHERE level = ? AND (plant = ? OR plant IS NULL)
             ORDER BY (plant IS NULL) ASC, user_id ASC
             LIMIT 1",
        )
        .bind(i64::from(level))
        .bind(plant)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approver(r)?)),
            None => Ok(None),
        }
    }

    async fn missing_levels(
        &self,
        required: u8,
        plant: &str,
    ) -> Result<Vec<u8>, RepositoryError> {
        // Load the candidate rows and let the directory rules decide which
        // rungs they actually staff.
        let rows = sqlx::query(
            "SELECT user_id, name, email, level, plant FROM approver
             WHERE level <= ? AND (plant = ? OR plant IS NULL)",
        )
        .bind(i64::from(required))
        .bind(plant)
        .fetch_all(&self.pool)
        .await?;

        let approvers = rows.iter().map(row_to_approver).collect::<Result<Vec<_>, _>>()?;
        let directory = InMemoryApproverDirectory::new(approvers);
        Ok(chain_gaps(&directory, required, plant))
    }

    async fn save(&self, approver: Approver) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approver (user_id, name, email, level, plant)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 level = excluded.level,
                 plant = excluded.plant",
        )
        .bind(&approver.user_id)
        .bind(&approver.name)
        .bind(&approver.email)
        .bind(i64::from(approver.level.get()))
        .bind(&approver.plant)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
