use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use freightgate_core::domain::ledger::{HistoryAction, HistoryRecord, LedgerSnapshot};
use freightgate_core::domain::order::{FreightOrder, OrderId};
use freightgate_core::machine::PlannedTransition;

use super::order::{order_status_as_str, parse_timestamp};
use super::{LedgerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_action(s: &str) -> Result<HistoryAction, RepositoryError> {
    match s {
        "APPROVED" => Ok(HistoryAction::Approved),
        "REJECTED" => Ok(HistoryAction::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown history action: {other}"))),
    }
}

fn action_as_str(action: HistoryAction) -> &'static str {
    match action {
        HistoryAction::Approved => "APPROVED",
        HistoryAction::Rejected => "REJECTED",
    }
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerSnapshot, RepositoryError> {
    let order_id: String =
        row.try_get("order_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let act_approv: i64 =
        row.try_get("act_approv").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let acted_by: Option<String> =
        row.try_get("acted_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let acted_at_str: Option<String> =
        row.try_get("acted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rejection_reason: Option<String> =
        row.try_get("rejection_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(LedgerSnapshot {
        order_id: OrderId(order_id),
        act_approv,
        acted_by,
        acted_at: acted_at_str.as_deref().map(parse_timestamp),
        rejection_reason,
    })
}

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let order_id: String =
        row.try_get("order_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let acting_user: String =
        row.try_get("acting_user").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_str: String =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level: i64 = row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recorded_at_str: String =
        row.try_get("recorded_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let level = u8::try_from(level)
        .map_err(|_| RepositoryError::Decode(format!("history level out of range: {level}")))?;

    Ok(HistoryRecord {
        id,
        order_id: OrderId(order_id),
        acting_user,
        action: parse_action(&action_str)?,
        level,
        comment,
        recorded_at: parse_timestamp(&recorded_at_str),
    })
}

#[async_trait::async_trait]
impl LedgerRepository for SqlLedgerRepository {
    async fn snapshot(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT order_id, act_approv, acted_by, acted_at, rejection_reason
             FROM approval_ledger WHERE order_id = ?",
        )
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_snapshot(r)?)),
            None => Ok(None),
        }
    }

    async fn advance(
        &self,
        order: &FreightOrder,
        planned: &PlannedTransition,
        now: DateTime<Utc>,
    ) -> Result<HistoryRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Guarded on the progress value the plan was computed against; a
        // concurrent writer at the same rung makes rows_affected zero.
        let updated = sqlx::query(
            "UPDATE approval_ledger
             SET act_approv = ?, acted_by = ?, acted_at = ?, rejection_reason = ?
             WHERE order_id = ? AND act_approv = ?",
        )
        .bind(planned.new_act_approv)
        .bind(&planned.acting_user)
        .bind(now.to_rfc3339())
        .bind(&planned.rejection_reason)
        .bind(&order.id.0)
        .bind(planned.expected_act_approv)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "approval progress for order {} moved past {}",
                order.id, planned.expected_act_approv
            )));
        }

        let record = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            acting_user: planned.acting_user.clone(),
            action: planned.action,
            level: planned.level,
            comment: planned.rejection_reason.clone(),
            recorded_at: now,
        };

        sqlx::query(
            "INSERT INTO approval_history (id, order_id, acting_user, action, level, comment, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.order_id.0)
        .bind(&record.acting_user)
        .bind(action_as_str(record.action))
        .bind(i64::from(record.level))
        .bind(&record.comment)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if let Some(status) = planned.new_order_status {
            sqlx::query("UPDATE freight_order SET status = ?, updated_at = ? WHERE id = ?")
                .bind(order_status_as_str(status))
                .bind(now.to_rfc3339())
                .bind(&order.id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn history(&self, order_id: &OrderId) -> Result<Vec<HistoryRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, order_id, acting_user, action, level, comment, recorded_at
             FROM approval_history WHERE order_id = ? ORDER BY recorded_at ASC, id ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    async fn apply_edit(
        &self,
        order: &FreightOrder,
        act_approv: i64,
        token: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Single winner: a concurrent submission that already consumed the
        // token makes rows_affected zero and the whole edit rolls back.
        let consumed = sqlx::query(
            "UPDATE edit_token SET status = 'used' WHERE token = ? AND status = 'released'",
        )
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "edit token {token} is no longer usable"
            )));
        }

        let updated = sqlx::query(
            "UPDATE freight_order
             SET plant = ?, description = ?, cost_amount = ?, cost_currency = ?, cost_eur = ?,
                 required_auth_level = ?, status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&order.plant)
        .bind(&order.description)
        .bind(order.cost_amount.to_string())
        .bind(&order.cost_currency)
        .bind(order.cost_eur.to_string())
        .bind(i64::from(order.required_auth_level))
        .bind(order_status_as_str(order.status))
        .bind(order.updated_at.to_rfc3339())
        .bind(&order.id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("order {} no longer exists", order.id)));
        }

        sqlx::query(
            "UPDATE approval_ledger
             SET act_approv = ?, rejection_reason = NULL
             WHERE order_id = ?",
        )
        .bind(act_approv)
        .bind(&order.id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
