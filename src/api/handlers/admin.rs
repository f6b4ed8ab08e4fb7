use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::with_store;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::notify::NotifyEvent;
use crate::storage::models::{Account, GrantRequest, RequestStatus};
use crate::workflow::{self, Decision};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub contact_email: String,
    pub created_at: String,
    pub decided_at: Option<String>,
    pub decided_by: Option<String>,
    pub id: String,
    /// Truncated identity digest, for display only
    pub identity: String,
    pub reason: String,
    pub status: RequestStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    #[serde(default = "default_actor")]
    pub decided_by: String,
}

fn default_actor() -> String {
    "admin".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub request: RequestResponse,
    /// Balance after the grant was applied
    pub tokens_remaining: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub request: RequestResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub created_at: String,
    /// Truncated identity digest, for display only
    pub identity: String,
    pub last_used_at: Option<String>,
    pub request_count: usize,
    pub tokens_remaining: u64,
    pub total_consumed: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    AppQuery(filter): AppQuery<RequestFilter>,
) -> Result<Json<JSend<Vec<RequestResponse>>>, ApiError> {
    // The review queue shows pending requests unless asked otherwise
    let status = match filter.status.as_deref() {
        None | Some("") | Some("pending") => Some(RequestStatus::Pending),
        Some("approved") => Some(RequestStatus::Approved),
        Some("rejected") => Some(RequestStatus::Rejected),
        Some("all") => None,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "Unknown status filter: {other}"
            )))
        }
    };

    let requests = with_store(&state, move |db| workflow::list_by_status(&db, status)).await?;

    Ok(JSend::success(
        requests.iter().map(request_to_response).collect(),
    ))
}

pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<DecideRequest>,
) -> Result<Json<JSend<ApproveResponse>>, ApiError> {
    let grant_amount = state.config.tokens.grant_amount;

    let (request, account) = with_store(&state, move |db| {
        workflow::decide(&db, &id, Decision::Approve, &req.decided_by, grant_amount)
    })
    .await?;

    state.notifier.publish(NotifyEvent::Decided {
        decision: Decision::Approve,
        request: request.clone(),
    });

    Ok(JSend::success(ApproveResponse {
        request: request_to_response(&request),
        tokens_remaining: account.map(|a| a.tokens_remaining),
    }))
}

pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<DecideRequest>,
) -> Result<Json<JSend<RejectResponse>>, ApiError> {
    let grant_amount = state.config.tokens.grant_amount;

    let (request, _) = with_store(&state, move |db| {
        workflow::decide(&db, &id, Decision::Reject, &req.decided_by, grant_amount)
    })
    .await?;

    state.notifier.publish(NotifyEvent::Decided {
        decision: Decision::Reject,
        request: request.clone(),
    });

    Ok(JSend::success(RejectResponse {
        request: request_to_response(&request),
    }))
}

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<AccountResponse>>>, ApiError> {
    let accounts = with_store(&state, move |db| db.get_all_accounts()).await?;

    Ok(JSend::success(
        accounts
            .iter()
            .map(|(identity, account)| account_to_response(identity.truncated(), account))
            .collect(),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn request_to_response(request: &GrantRequest) -> RequestResponse {
    RequestResponse {
        contact_email: request.contact_email.clone(),
        created_at: request.created_at.to_rfc3339(),
        decided_at: request.decided_at.map(|t| t.to_rfc3339()),
        decided_by: request.decided_by.clone(),
        id: request.id.clone(),
        identity: request.identity.truncated(),
        reason: request.reason.clone(),
        status: request.status,
    }
}

fn account_to_response(identity: String, account: &Account) -> AccountResponse {
    AccountResponse {
        created_at: account.created_at.to_rfc3339(),
        identity,
        last_used_at: account.last_used_at.map(|t| t.to_rfc3339()),
        request_count: account.request_count(),
        tokens_remaining: account.tokens_remaining,
        total_consumed: account.total_consumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::ledger;
    use crate::testutil::{setup_db, test_identity, test_state};

    fn submit_for(state: &Arc<AppState>, identity: &Identity) -> GrantRequest {
        ledger::initialize_if_absent(&state.db, identity, 4).unwrap();
        workflow::submit(&state.db, identity, "a@b.com", "need more").unwrap()
    }

    #[tokio::test]
    async fn test_list_requests_defaults_to_pending() {
        let (db, _temp) = setup_db();
        let state = test_state(db);
        let identity = test_identity("alice");

        let pending = submit_for(&state, &identity);
        let decided = submit_for(&state, &identity);
        workflow::decide(&state.db, &decided.id, Decision::Reject, "admin", 4).unwrap();

        let response = list_requests(
            State(Arc::clone(&state)),
            AppQuery(RequestFilter { status: None }),
        )
        .await
        .unwrap();
        let listed = &response.0.data;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
        assert_eq!(listed[0].identity, identity.truncated());

        let response = list_requests(
            State(Arc::clone(&state)),
            AppQuery(RequestFilter {
                status: Some("all".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.data.len(), 2);

        let bad = list_requests(
            State(state),
            AppQuery(RequestFilter {
                status: Some("bogus".to_string()),
            }),
        )
        .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_approve_then_reapprove_fails() {
        let (db, _temp) = setup_db();
        let state = test_state(db);
        let identity = test_identity("alice");
        let request = submit_for(&state, &identity);

        let response = approve_request(
            State(Arc::clone(&state)),
            Path(request.id.clone()),
            AppJson(DecideRequest {
                decided_by: "admin".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.data.tokens_remaining, Some(8));
        assert_eq!(response.0.data.request.status, RequestStatus::Approved);

        let again = approve_request(
            State(Arc::clone(&state)),
            Path(request.id),
            AppJson(DecideRequest {
                decided_by: "admin".to_string(),
            }),
        )
        .await;
        assert!(again.is_err());

        // No double grant
        let balance = state
            .db
            .get_account(&identity)
            .unwrap()
            .unwrap()
            .tokens_remaining;
        assert_eq!(balance, 8);
    }

    #[tokio::test]
    async fn test_list_accounts_truncates_identity() {
        let (db, _temp) = setup_db();
        let state = test_state(db);
        let identity = test_identity("alice");
        ledger::initialize_if_absent(&state.db, &identity, 4).unwrap();

        let response = list_accounts(State(state)).await.unwrap();
        let listed = &response.0.data;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identity, identity.truncated());
        assert_eq!(listed[0].tokens_remaining, 4);
    }
}
