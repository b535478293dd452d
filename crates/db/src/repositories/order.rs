use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite};

use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Typed queue query; every field maps to one SQL predicate.
#[derive(Clone, Debug)]
pub struct QueueFilter {
    /// Orders waiting on exactly this level.
    pub approval_level: u8,
    pub plant: Option<String>,
    /// Matched against order id and description.
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub order: FreightOrder,
    pub act_approv: i64,
}

#[derive(Clone, Debug)]
pub struct QueuePage {
    pub entries: Vec<QueueEntry>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

pub(crate) fn order_status_as_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Approved => "approved",
        OrderStatus::Rejected => "rejected",
    }
}

fn parse_order_status(s: &str) -> OrderStatus {
    match s {
        "approved" => OrderStatus::Approved,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal for {field}: {error}")))
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<FreightOrder, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plant: String = row.try_get("plant").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost_amount_str: String =
        row.try_get("cost_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost_currency: String =
        row.try_get("cost_currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost_eur_str: String =
        row.try_get("cost_eur").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required_auth_level: i64 =
        row.try_get("required_auth_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_by: String =
        row.try_get("created_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let required_auth_level = u8::try_from(required_auth_level).map_err(|_| {
        RepositoryError::Decode(format!("required_auth_level out of range: {required_auth_level}"))
    })?;

    Ok(FreightOrder {
        id: OrderId(id),
        plant,
        description,
        cost_amount: parse_decimal("cost_amount", &cost_amount_str)?,
        cost_currency,
        cost_eur: parse_decimal("cost_eur", &cost_eur_str)?,
        required_auth_level,
        created_by,
        status: parse_order_status(&status_str),
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn push_queue_predicates(builder: &mut QueryBuilder<'_, Sqlite>, filter: &QueueFilter) {
    builder
        .push(" WHERE o.status = 'pending' AND l.act_approv = ")
        .push_bind(i64::from(filter.approval_level) - 1);

    if let Some(plant) = filter.plant.clone() {
        builder.push(" AND o.plant = ").push_bind(plant);
    }

    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        builder
            .push(" AND (o.id LIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.description LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<FreightOrder>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, plant, description, cost_amount, cost_currency, cost_eur,
                    required_auth_level, created_by, status, created_at, updated_at
             FROM freight_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, order: FreightOrder) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO freight_order
                 (id, plant, description, cost_amount, cost_currency, cost_eur,
                  required_auth_level, created_by, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.plant)
        .bind(&order.description)
        .bind(order.cost_amount.to_string())
        .bind(&order.cost_currency)
        .bind(order.cost_eur.to_string())
        .bind(i64::from(order.required_auth_level))
        .bind(&order.created_by)
        .bind(order_status_as_str(order.status))
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("order {} already exists", order.id)));
        }

        sqlx::query("INSERT INTO approval_ledger (order_id, act_approv) VALUES (?, 0)")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_queue(&self, filter: &QueueFilter) -> Result<QueuePage, RepositoryError> {
        let limit = filter.limit.max(1);
        let page = filter.page.max(1);
        let offset = i64::from(page - 1) * i64::from(limit);

        let mut count_builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS count
             FROM freight_order o
             JOIN approval_ledger l ON l.order_id = o.id",
        );
        push_queue_predicates(&mut count_builder, filter);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("count")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT o.id, o.plant, o.description, o.cost_amount, o.cost_currency, o.cost_eur,
                    o.required_auth_level, o.created_by, o.status, o.created_at, o.updated_at,
                    l.act_approv
             FROM freight_order o
             JOIN approval_ledger l ON l.order_id = o.id",
        );
        push_queue_predicates(&mut builder, filter);
        builder.push(" ORDER BY o.created_at ASC, o.id ASC LIMIT ").push_bind(i64::from(limit));
        builder.push(" OFFSET ").push_bind(offset);

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let act_approv: i64 =
                row.try_get("act_approv").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            entries.push(QueueEntry { order: row_to_order(row)?, act_approv });
        }

        Ok(QueuePage { entries, total, page, limit })
    }
}
