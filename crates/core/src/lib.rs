pub mod audit;
pub mod config;
pub mod directory;
pub mod domain;
pub mod edit;
pub mod errors;
pub mod levels;
pub mod machine;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use directory::{chain_gaps, ApproverDirectory, InMemoryApproverDirectory};
pub use domain::approver::{ApprovalLevel, Approver};
pub use domain::edit_token::{EditToken, EditTokenStatus};
pub use domain::ledger::{
    ApprovalState, HistoryAction, HistoryRecord, LedgerSnapshot, REJECTED_SENTINEL,
};
pub use domain::order::{FreightOrder, OrderId, OrderStatus};
pub use edit::{resolve_resume_point, ResumePoint};
pub use errors::{ChainError, LevelError, TransitionError};
pub use levels::{normalize_to_eur, required_level_for_cost, CurrencyRates};
pub use machine::{plan_transition, ActorContext, ApprovalAction, PlannedTransition};
