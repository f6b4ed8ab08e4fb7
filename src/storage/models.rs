use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// What a usage-history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageAction {
    Consume,
    Grant,
    Request,
}

/// One entry in an account's usage history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub action: UsageAction,
    /// The metered feature, or a tag like "token_request" / the grant reason
    pub feature: String,
    pub timestamp: DateTime<Utc>,
}

/// A per-identity token account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// When the account was first initialized
    pub created_at: DateTime<Utc>,
    /// When a token was last consumed
    pub last_used_at: Option<DateTime<Utc>>,
    /// Current balance; unsigned, so it can never go negative
    pub tokens_remaining: u64,
    /// Lifetime consumption; only ever increases
    pub total_consumed: u64,
    pub usage_history: Vec<UsageEntry>,
}

impl Account {
    pub fn new(now: DateTime<Utc>, starting_balance: u64) -> Self {
        Self {
            created_at: now,
            last_used_at: None,
            tokens_remaining: starting_balance,
            total_consumed: 0,
            usage_history: Vec::new(),
        }
    }

    pub fn has_balance(&self) -> bool {
        self.tokens_remaining > 0
    }

    /// Number of grant requests this account has submitted
    pub fn request_count(&self) -> usize {
        self.usage_history
            .iter()
            .filter(|e| e.action == UsageAction::Request)
            .count()
    }
}

/// Grant request lifecycle. Approved and Rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Approved,
    Pending,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// A consumer's request for more tokens, reviewed by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    pub contact_email: String,
    pub created_at: DateTime<Utc>,
    /// Set once, when the request reaches a terminal state
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    /// UUID, assigned at submission
    pub id: String,
    pub identity: Identity,
    pub reason: String,
    pub status: RequestStatus,
}
