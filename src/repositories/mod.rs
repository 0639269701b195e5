//! Data access layer. Each repository owns the SQL for one aggregate and
//! keeps its mutations atomic at the statement level.

pub mod job_repository;
pub mod ledger_repository;
pub mod user_repository;

pub use job_repository::JobRepository;
pub use ledger_repository::{LedgerRepository, PaymentEvent};
pub use user_repository::UserRepository;
