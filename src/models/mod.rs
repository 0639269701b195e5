//! Domain models for the Textora backend.
//!
//! This module contains all database-backed models representing the core
//! entities: users (identity + wallet), the append-only transaction ledger
//! and asynchronous jobs.

pub mod job;
pub mod tokens;
pub mod transaction;
pub mod user;

// Re-export all models for convenient access
pub use job::{Job, JobStatus};
pub use tokens::{Tokens, TOKEN_SCALE};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{BonusKind, IdentityClaim, User};
