//! token-meter - anonymous usage metering with an operator grant workflow
//!
//! This crate meters access to expensive features with:
//! - Pseudonymous identities derived from connection metadata (soft lookup
//!   keys, not credentials)
//! - A per-identity token ledger with non-negative balances and monotonic
//!   usage counters
//! - A submit/decide grant-request workflow with exactly-once approval
//!   top-ups
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - Best-effort email notifications decoupled from workflow success
//! - REST API

pub mod api;
pub mod config;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod workflow;

use config::Config;
use notify::NotifyHandle;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub notifier: NotifyHandle,
}
