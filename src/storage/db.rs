use redb::{
    Database as RedbDatabase, ReadTransaction, ReadableTable, Table, WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::models::{Account, GrantRequest};
use super::tables::*;
use crate::identity::Identity;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

/// Durable store for the account and grant-request collections.
///
/// redb admits a single write transaction at a time, so every
/// read-modify-write that goes through `begin_write` is serialized at the
/// storage layer. Cheap to clone; clones share the underlying database.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("token-meter.redb");
        let db = RedbDatabase::create(db_path)?;

        // Create tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(REQUESTS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Account operations
    // ========================================================================

    /// Get an account by identity digest
    pub fn get_account(&self, identity: &Identity) -> Result<Option<Account>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        read_account(&table, identity)
    }

    /// Store an account
    pub fn put_account(
        &self,
        identity: &Identity,
        account: &Account,
    ) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            write_account(&mut table, identity, account)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get all accounts (for admin projections)
    pub fn get_all_accounts(&self) -> Result<Vec<(Identity, Account)>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;

        let mut accounts = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            let account: Account = bincode::deserialize(value.value())?;
            accounts.push((Identity::from_digest(key.value().to_string()), account));
        }

        Ok(accounts)
    }

    // ========================================================================
    // Grant-request operations
    // ========================================================================

    /// Get a grant request by id
    pub fn get_request(&self, request_id: &str) -> Result<Option<GrantRequest>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;
        read_request(&table, request_id)
    }

    /// Store a grant request
    pub fn put_request(&self, request: &GrantRequest) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(REQUESTS)?;
            write_request(&mut table, request)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get all grant requests (for admin projections)
    pub fn get_all_requests(&self) -> Result<Vec<GrantRequest>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;

        let mut requests = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let request: GrantRequest = bincode::deserialize(value.value())?;
            requests.push(request);
        }

        Ok(requests)
    }
}

// ============================================================================
// In-transaction helpers
//
// Used by the ledger and workflow modules to read-modify-write inside a
// single open write transaction.
// ============================================================================

pub(crate) fn read_account<T>(
    table: &T,
    identity: &Identity,
) -> Result<Option<Account>, DatabaseError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(identity.as_str())? {
        Some(data) => Ok(Some(bincode::deserialize(data.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_account(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    identity: &Identity,
    account: &Account,
) -> Result<(), DatabaseError> {
    let data = bincode::serialize(account)?;
    table.insert(identity.as_str(), data.as_slice())?;
    Ok(())
}

pub(crate) fn read_request<T>(
    table: &T,
    request_id: &str,
) -> Result<Option<GrantRequest>, DatabaseError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(request_id)? {
        Some(data) => Ok(Some(bincode::deserialize(data.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_request(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    request: &GrantRequest,
) -> Result<(), DatabaseError> {
    let data = bincode::serialize(request)?;
    table.insert(request.id.as_str(), data.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::storage::models::RequestStatus;
    use crate::testutil::{setup_db, test_identity};

    #[test]
    fn test_account_round_trip() {
        let (db, _temp) = setup_db();
        let identity = test_identity("alice");

        assert!(db.get_account(&identity).unwrap().is_none());

        let account = Account::new(Utc::now(), 4);
        db.put_account(&identity, &account).unwrap();

        let loaded = db.get_account(&identity).unwrap().unwrap();
        assert_eq!(loaded.tokens_remaining, 4);
        assert_eq!(loaded.total_consumed, 0);
        assert_eq!(loaded.created_at, account.created_at);
    }

    #[test]
    fn test_request_round_trip() {
        let (db, _temp) = setup_db();

        let request = GrantRequest {
            contact_email: "a@b.com".to_string(),
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
            id: "r1".to_string(),
            identity: test_identity("alice"),
            reason: "need more".to_string(),
            status: RequestStatus::Pending,
        };
        db.put_request(&request).unwrap();

        let loaded = db.get_request("r1").unwrap().unwrap();
        assert_eq!(loaded.contact_email, "a@b.com");
        assert_eq!(loaded.status, RequestStatus::Pending);
        assert!(db.get_request("missing").unwrap().is_none());
    }

    #[test]
    fn test_get_all() {
        let (db, _temp) = setup_db();

        db.put_account(&test_identity("a"), &Account::new(Utc::now(), 4))
            .unwrap();
        db.put_account(&test_identity("b"), &Account::new(Utc::now(), 2))
            .unwrap();

        let accounts = db.get_all_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(db.get_all_requests().unwrap().is_empty());
    }
}
