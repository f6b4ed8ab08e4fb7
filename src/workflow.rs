//! Grant-request workflow: submit and decide.
//!
//! A request is born Pending and transitions exactly once to Approved or
//! Rejected. An approval applies its token grant in the same write
//! transaction as the status change, so a request can never pay out twice,
//! not even across a crash between the two writes.

use chrono::Utc;
use thiserror::Error;

use crate::identity::Identity;
use crate::ledger;
use crate::storage::models::{Account, GrantRequest, RequestStatus, UsageAction, UsageEntry};
use crate::storage::{
    read_account, read_request, write_account, write_request, Database, DatabaseError, ACCOUNTS,
    REQUESTS,
};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Request not found or already processed")]
    NotFoundOrDecided,
    #[error("{0}")]
    Validation(String),
}

impl From<redb::TableError> for WorkflowError {
    fn from(e: redb::TableError) -> Self {
        Self::Database(e.into())
    }
}

impl From<redb::CommitError> for WorkflowError {
    fn from(e: redb::CommitError) -> Self {
        Self::Database(e.into())
    }
}

/// Operator verdict on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Submit a new grant request for the given identity.
///
/// Both fields must be non-empty after trimming. Pending requests are not
/// deduplicated: resubmission always creates a fresh request with its own id.
pub fn submit(
    db: &Database,
    identity: &Identity,
    contact_email: &str,
    reason: &str,
) -> Result<GrantRequest, WorkflowError> {
    let contact_email = contact_email.trim();
    let reason = reason.trim();
    if contact_email.is_empty() {
        return Err(WorkflowError::Validation("email is required".to_string()));
    }
    if reason.is_empty() {
        return Err(WorkflowError::Validation("reason is required".to_string()));
    }

    let now = Utc::now();
    let request = GrantRequest {
        contact_email: contact_email.to_string(),
        created_at: now,
        decided_at: None,
        decided_by: None,
        id: uuid::Uuid::new_v4().to_string(),
        identity: identity.clone(),
        reason: reason.to_string(),
        status: RequestStatus::Pending,
    };

    let write_txn = db.begin_write()?;
    {
        let mut requests = write_txn.open_table(REQUESTS)?;
        write_request(&mut requests, &request)?;

        // Record the submission on the account's usage history
        let mut accounts = write_txn.open_table(ACCOUNTS)?;
        if let Some(mut account) = read_account(&accounts, identity)? {
            account.usage_history.push(UsageEntry {
                action: UsageAction::Request,
                feature: "token_request".to_string(),
                timestamp: now,
            });
            write_account(&mut accounts, identity, &account)?;
        }
    }
    write_txn.commit()?;

    tracing::info!(
        request_id = %request.id,
        identity = %identity.truncated(),
        "Grant request submitted"
    );
    Ok(request)
}

/// Decide a pending request.
///
/// Fails with `NotFoundOrDecided` (no side effect) when the id is unknown or
/// the request is already terminal. On approval the account is topped up by
/// `grant_amount` exactly once, atomically with the status change, and the
/// updated account is returned alongside the request.
pub fn decide(
    db: &Database,
    request_id: &str,
    decision: Decision,
    actor: &str,
    grant_amount: u64,
) -> Result<(GrantRequest, Option<Account>), WorkflowError> {
    let now = Utc::now();
    let write_txn = db.begin_write()?;
    let (request, account) = {
        let mut requests = write_txn.open_table(REQUESTS)?;
        let mut request =
            read_request(&requests, request_id)?.ok_or(WorkflowError::NotFoundOrDecided)?;
        if request.status.is_terminal() {
            return Err(WorkflowError::NotFoundOrDecided);
        }

        request.status = match decision {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        };
        request.decided_at = Some(now);
        request.decided_by = Some(actor.to_string());
        write_request(&mut requests, &request)?;

        let account = match decision {
            Decision::Approve => {
                let mut accounts = write_txn.open_table(ACCOUNTS)?;
                let mut account = read_account(&accounts, &request.identity)?
                    .unwrap_or_else(|| Account::new(now, 0));
                ledger::apply_grant(&mut account, grant_amount, "request-approval", now);
                write_account(&mut accounts, &request.identity, &account)?;
                Some(account)
            }
            Decision::Reject => None,
        };
        (request, account)
    };
    write_txn.commit()?;

    tracing::info!(request_id, decision = ?decision, actor, "Grant request decided");
    Ok((request, account))
}

/// List requests, optionally filtered by status, newest first
pub fn list_by_status(
    db: &Database,
    status: Option<RequestStatus>,
) -> Result<Vec<GrantRequest>, WorkflowError> {
    let mut requests = db.get_all_requests()?;
    if let Some(status) = status {
        requests.retain(|r| r.status == status);
    }
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(requests)
}

/// List every request regardless of status, newest first
pub fn list_all(db: &Database) -> Result<Vec<GrantRequest>, WorkflowError> {
    list_by_status(db, None)
}
