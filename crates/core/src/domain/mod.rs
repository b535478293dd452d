pub mod approver;
pub mod edit_token;
pub mod ledger;
pub mod order;
