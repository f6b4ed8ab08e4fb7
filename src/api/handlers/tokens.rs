use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::with_store;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::identity::{self, ClientMeta, Identity};
use crate::ledger;
use crate::notify::NotifyEvent;
use crate::storage::models::Account;
use crate::workflow;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub feature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusResponse {
    pub created_at: String,
    pub has_tokens: bool,
    pub last_used_at: Option<String>,
    pub tokens_remaining: u64,
    pub total_consumed: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub tokens_remaining: u64,
    pub total_consumed: u64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub request_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn token_status(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<JSend<TokenStatusResponse>>, ApiError> {
    let identity = caller_identity(&addr, &headers);
    let starting_balance = state.config.tokens.starting_balance;

    let account = with_store(&state, move |db| {
        ledger::initialize_if_absent(&db, &identity, starting_balance)
    })
    .await?;

    Ok(JSend::success(status_response(&account)))
}

pub async fn consume_token(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AppJson(req): AppJson<ConsumeRequest>,
) -> Result<Json<JSend<ConsumeResponse>>, ApiError> {
    let identity = caller_identity(&addr, &headers);
    let starting_balance = state.config.tokens.starting_balance;

    let account = with_store(&state, move |db| -> Result<Account, ApiError> {
        ledger::initialize_if_absent(&db, &identity, starting_balance)?;
        Ok(ledger::consume(&db, &identity, &req.feature)?)
    })
    .await?;

    Ok(JSend::success(ConsumeResponse {
        tokens_remaining: account.tokens_remaining,
        total_consumed: account.total_consumed,
    }))
}

pub async fn request_tokens(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AppJson(req): AppJson<SubmitRequest>,
) -> Result<Json<JSend<SubmitResponse>>, ApiError> {
    let identity = caller_identity(&addr, &headers);
    let starting_balance = state.config.tokens.starting_balance;

    let request = with_store(&state, move |db| -> Result<_, ApiError> {
        ledger::initialize_if_absent(&db, &identity, starting_balance)?;
        Ok(workflow::submit(&db, &identity, &req.email, &req.reason)?)
    })
    .await?;

    // Off the critical path: the request is submitted whether or not the
    // operator email goes out.
    state.notifier.publish(NotifyEvent::Submitted(request.clone()));

    Ok(JSend::success(SubmitResponse {
        request_id: request.id,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn caller_identity(addr: &SocketAddr, headers: &HeaderMap) -> Identity {
    identity::derive(&ClientMeta::from_request(addr, headers))
}

fn status_response(account: &Account) -> TokenStatusResponse {
    TokenStatusResponse {
        created_at: account.created_at.to_rfc3339(),
        has_tokens: account.has_balance(),
        last_used_at: account.last_used_at.map(|t| t.to_rfc3339()),
        tokens_remaining: account.tokens_remaining,
        total_consumed: account.total_consumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{setup_db, test_state};

    fn local_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_status_initializes_account() {
        let (db, _temp) = setup_db();
        let state = test_state(db);

        let response = token_status(
            State(Arc::clone(&state)),
            ConnectInfo(local_addr()),
            HeaderMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.0.data.tokens_remaining, 4);
        assert!(response.0.data.has_tokens);
        assert!(response.0.data.last_used_at.is_none());
    }

    #[tokio::test]
    async fn test_consume_decrements_and_then_denies() {
        let (db, _temp) = setup_db();
        let state = test_state(db);

        for expected in [3, 2, 1, 0] {
            let response = consume_token(
                State(Arc::clone(&state)),
                ConnectInfo(local_addr()),
                HeaderMap::new(),
                AppJson(ConsumeRequest {
                    feature: "ux_audit".to_string(),
                }),
            )
            .await
            .unwrap();
            assert_eq!(response.0.data.tokens_remaining, expected);
        }

        let denied = consume_token(
            State(Arc::clone(&state)),
            ConnectInfo(local_addr()),
            HeaderMap::new(),
            AppJson(ConsumeRequest {
                feature: "ux_audit".to_string(),
            }),
        )
        .await;
        assert!(matches!(denied, Err(ApiError::Fail { code: Some("NO_TOKENS"), .. })));
    }

    #[tokio::test]
    async fn test_request_tokens_validates_fields() {
        let (db, _temp) = setup_db();
        let state = test_state(db);

        let rejected = request_tokens(
            State(Arc::clone(&state)),
            ConnectInfo(local_addr()),
            HeaderMap::new(),
            AppJson(SubmitRequest {
                email: String::new(),
                reason: "need more".to_string(),
            }),
        )
        .await;
        assert!(matches!(rejected, Err(ApiError::Fail { code: None, .. })));

        let accepted = request_tokens(
            State(Arc::clone(&state)),
            ConnectInfo(local_addr()),
            HeaderMap::new(),
            AppJson(SubmitRequest {
                email: "a@b.com".to_string(),
                reason: "need more".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!accepted.0.data.request_id.is_empty());
    }
}
