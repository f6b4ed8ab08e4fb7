mod admin;
mod tokens;

use std::sync::Arc;
use std::time::Duration;

use crate::api::response::ApiError;
use crate::storage::Database;
use crate::AppState;

pub use admin::{approve_request, health, list_accounts, list_requests, reject_request};
pub use tokens::{consume_token, request_tokens, token_status};

/// Run a storage operation on the blocking pool with a bounded wait.
///
/// A mutation that cannot commit within the configured timeout fails with a
/// 500 instead of hanging: success must never be reported for an
/// un-persisted write.
///
/// The blocking task is not cancelled when the timeout fires, so a write
/// stuck behind the storage lock may still commit after the caller has
/// already reported failure. Callers treat the timeout as failure and skip
/// follow-up work such as notifications, which can leave such an orphaned
/// write without its operator email.
pub(crate) async fn with_store<T, E, F>(state: &Arc<AppState>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let db = state.db.clone();
    let timeout = Duration::from_millis(state.config.tokens.write_timeout_ms);

    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || op(db))).await {
        Ok(Ok(result)) => result.map_err(Into::into),
        Ok(Err(e)) => Err(ApiError::internal(format!("Storage task failed: {e}"))),
        Err(_) => Err(ApiError::internal("Storage operation timed out")),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::storage::DatabaseError;
    use crate::testutil::{setup_db, test_config, test_state_with_config};

    #[tokio::test]
    async fn test_with_store_fails_with_500_instead_of_hanging() {
        let (db, _temp) = setup_db();
        let mut config = test_config();
        config.tokens.write_timeout_ms = 50;
        let state = test_state_with_config(db.clone(), config);

        // Hold the single writer so the stored op cannot make progress
        let guard = db.begin_write().unwrap();

        let result = with_store(&state, |db| -> Result<(), DatabaseError> {
            let write_txn = db.begin_write()?;
            write_txn.commit()?;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(ApiError::Error(status, _)) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));

        // Release the writer so the abandoned blocking task can finish
        guard.abort().unwrap();
    }
}
