use sqlx::Row;

use freightgate_core::domain::edit_token::{EditToken, EditTokenStatus};
use freightgate_core::domain::order::OrderId;

use super::order::parse_timestamp;
use super::{EditTokenRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEditTokenRepository {
    pool: DbPool,
}

impl SqlEditTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, token: &str) -> Result<EditToken, RepositoryError> {
        self.find(token)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("edit token {token} does not exist")))
    }
}

fn status_as_str(status: EditTokenStatus) -> &'static str {
    match status {
        EditTokenStatus::Issued => "issued",
        EditTokenStatus::Released => "released",
        EditTokenStatus::Used => "used",
    }
}

fn parse_status(s: &str) -> Result<EditTokenStatus, RepositoryError> {
    match s {
        "issued" => Ok(EditTokenStatus::Issued),
        "released" => Ok(EditTokenStatus::Released),
        "used" => Ok(EditTokenStatus::Used),
        other => Err(RepositoryError::Decode(format!("unknown edit token status: {other}"))),
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<EditToken, RepositoryError> {
    let token: String =
        row.try_get("token").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let order_id: String =
        row.try_get("order_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reason: String =
        row.try_get("reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(EditToken {
        token,
        order_id: OrderId(order_id),
        requested_by,
        reason,
        status: parse_status(&status_str)?,
        created_at: parse_timestamp(&created_at_str),
        expires_at: parse_timestamp(&expires_at_str),
    })
}

#[async_trait::async_trait]
impl EditTokenRepository for SqlEditTokenRepository {
    async fn find(&self, token: &str) -> Result<Option<EditToken>, RepositoryError> {
        let row = sqlx::query(
            "SELECT token, order_id, requested_by, reason, status, created_at, expires_at
             FROM edit_token WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_token(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, token: EditToken) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO edit_token (token, order_id, requested_by, reason, status, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET
                 status = excluded.status,
                 expires_at = excluded.expires_at",
        )
        .bind(&token.token)
        .bind(&token.order_id.0)
        .bind(&token.requested_by)
        .bind(&token.reason)
        .bind(status_as_str(token.status))
        .bind(token.created_at.to_rfc3339())
        .bind(token.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(&self, token: &str) -> Result<EditToken, RepositoryError> {
        let updated =
            sqlx::query("UPDATE edit_token SET status = 'released' WHERE token = ? AND status = 'issued'")
                .bind(token)
                .execute(&self.pool)
                .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "edit token {token} is not awaiting release"
            )));
        }

        self.fetch(token).await
    }
}
