use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use freightgate_core::domain::approver::Approver;
use freightgate_core::domain::edit_token::EditToken;
use freightgate_core::domain::ledger::{HistoryRecord, LedgerSnapshot};
use freightgate_core::domain::order::{FreightOrder, OrderId};
use freightgate_core::machine::PlannedTransition;

pub mod approver;
pub mod edit_token;
pub mod ledger;
pub mod order;
pub mod session;

pub use approver::SqlApproverRepository;
pub use edit_token::SqlEditTokenRepository;
pub use ledger::SqlLedgerRepository;
pub use order::{QueueEntry, QueueFilter, QueuePage, SqlOrderRepository};
pub use session::{SessionRecord, SqlSessionRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("write conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<FreightOrder>, RepositoryError>;

    /// Insert the order together with its untouched ledger row, atomically.
    async fn create(&self, order: FreightOrder) -> Result<(), RepositoryError>;

    async fn list_queue(&self, filter: &QueueFilter) -> Result<QueuePage, RepositoryError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn snapshot(&self, order_id: &OrderId)
        -> Result<Option<LedgerSnapshot>, RepositoryError>;

    /// Persist a planned approve/reject in one transaction. The ledger update
    /// is guarded on the progress value the plan was computed against;
    /// `Conflict` means someone else advanced the row first and the caller
    /// should re-read and re-plan.
    async fn advance(
        &self,
        order: &FreightOrder,
        planned: &PlannedTransition,
        now: DateTime<Utc>,
    ) -> Result<HistoryRecord, RepositoryError>;

    async fn history(&self, order_id: &OrderId) -> Result<Vec<HistoryRecord>, RepositoryError>;

    /// Apply an accepted edit submission in one transaction: consume the
    /// released token, rewrite the order row, and reset the ledger to the
    /// computed resume progress. `Conflict` when the token lost the
    /// single-winner race or was never released; nothing is written in that
    /// case.
    async fn apply_edit(
        &self,
        order: &FreightOrder,
        act_approv: i64,
        token: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApproverRepository: Send + Sync {
    /// The approver responsible for `level` at `plant`. Plant-specific
    /// approvers win over regional ones.
    async fn resolve(&self, level: u8, plant: &str)
        -> Result<Option<Approver>, RepositoryError>;

    /// Levels 1..=required with no plant-specific or regional approver.
    async fn missing_levels(&self, required: u8, plant: &str)
        -> Result<Vec<u8>, RepositoryError>;

    async fn save(&self, approver: Approver) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EditTokenRepository: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<EditToken>, RepositoryError>;
    async fn save(&self, token: EditToken) -> Result<(), RepositoryError>;

    /// Issued -> Released. `Conflict` when the token is not awaiting release.
    /// The Released -> Used step belongs to [`LedgerRepository::apply_edit`]
    /// so it commits together with the edit it authorizes.
    async fn release(&self, token: &str) -> Result<EditToken, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, RepositoryError>;

    async fn save(&self, session: SessionRecord) -> Result<(), RepositoryError>;
}
