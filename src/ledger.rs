//! Token ledger: per-identity balances and usage counters.
//!
//! Every mutation is a read-modify-write inside a single redb write
//! transaction. redb admits one writer at a time, so concurrent calls on the
//! same identity serialize at the storage layer and the balance can never be
//! spent twice.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::identity::Identity;
use crate::storage::models::{Account, UsageAction, UsageEntry};
use crate::storage::{read_account, write_account, Database, DatabaseError, ACCOUNTS};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("No tokens remaining")]
    InsufficientBalance,
}

impl From<redb::TableError> for LedgerError {
    fn from(e: redb::TableError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::CommitError> for LedgerError {
    fn from(e: redb::CommitError) -> Self {
        Self::Database(e.into())
    }
}

/// Create an account with the given starting balance if none exists.
///
/// Safe to call on every request: an existing account is returned unchanged,
/// with its balance and timestamps intact.
pub fn initialize_if_absent(
    db: &Database,
    identity: &Identity,
    starting_balance: u64,
) -> Result<Account, LedgerError> {
    let write_txn = db.begin_write()?;
    let account = {
        let mut table = write_txn.open_table(ACCOUNTS)?;
        match read_account(&table, identity)? {
            Some(existing) => existing,
            None => {
                let account = Account::new(Utc::now(), starting_balance);
                write_account(&mut table, identity, &account)?;
                tracing::debug!(identity = %identity.truncated(), starting_balance, "Created account");
                account
            }
        }
    };
    write_txn.commit()?;
    Ok(account)
}

/// True iff the identity has an account with tokens remaining
pub fn has_balance(db: &Database, identity: &Identity) -> Result<bool, LedgerError> {
    Ok(db
        .get_account(identity)?
        .map(|a| a.has_balance())
        .unwrap_or(false))
}

/// Spend one token on a feature.
///
/// Fails with `InsufficientBalance` when the account is empty or unknown;
/// otherwise decrements the balance, bumps the usage counters, and persists
/// before returning the updated account.
pub fn consume(db: &Database, identity: &Identity, feature: &str) -> Result<Account, LedgerError> {
    let write_txn = db.begin_write()?;
    let updated = {
        let mut table = write_txn.open_table(ACCOUNTS)?;
        let mut account =
            read_account(&table, identity)?.ok_or(LedgerError::InsufficientBalance)?;
        if account.tokens_remaining == 0 {
            return Err(LedgerError::InsufficientBalance);
        }

        let now = Utc::now();
        account.tokens_remaining -= 1;
        account.total_consumed += 1;
        account.last_used_at = Some(now);
        account.usage_history.push(UsageEntry {
            action: UsageAction::Consume,
            feature: feature.to_string(),
            timestamp: now,
        });

        write_account(&mut table, identity, &account)?;
        account
    };
    write_txn.commit()?;

    tracing::debug!(
        identity = %identity.truncated(),
        feature,
        remaining = updated.tokens_remaining,
        "Consumed token"
    );
    Ok(updated)
}

/// Top up an identity's balance.
///
/// Creates the account first when absent so a grant is never silently
/// dropped.
pub fn grant(
    db: &Database,
    identity: &Identity,
    amount: u64,
    reason: &str,
) -> Result<Account, LedgerError> {
    let write_txn = db.begin_write()?;
    let updated = {
        let mut table = write_txn.open_table(ACCOUNTS)?;
        let now = Utc::now();
        let mut account =
            read_account(&table, identity)?.unwrap_or_else(|| Account::new(now, 0));
        apply_grant(&mut account, amount, reason, now);
        write_account(&mut table, identity, &account)?;
        account
    };
    write_txn.commit()?;

    tracing::info!(
        identity = %identity.truncated(),
        amount,
        reason,
        remaining = updated.tokens_remaining,
        "Granted tokens"
    );
    Ok(updated)
}

/// Read an identity's account, if it exists
pub fn status(db: &Database, identity: &Identity) -> Result<Option<Account>, LedgerError> {
    Ok(db.get_account(identity)?)
}

/// Apply a grant mutation to an already-loaded account.
///
/// Shared with the workflow so an approval's top-up lands in the same write
/// transaction as the status change.
pub(crate) fn apply_grant(account: &mut Account, amount: u64, reason: &str, now: DateTime<Utc>) {
    account.tokens_remaining += amount;
    account.usage_history.push(UsageEntry {
        action: UsageAction::Grant,
        feature: reason.to_string(),
        timestamp: now,
    });
}
