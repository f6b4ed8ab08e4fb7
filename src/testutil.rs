//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{Config, EmailConfig, NodeConfig, TokenConfig};
use crate::identity::{self, ClientMeta, Identity};
use crate::notify::Notifier;
use crate::storage::Database;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard — the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A minimal `Config` suitable for unit tests
pub fn test_config() -> Config {
    Config {
        email: EmailConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        tokens: TokenConfig::default(),
    }
}

/// Derive a deterministic identity from a seed string
pub fn test_identity(seed: &str) -> Identity {
    identity::derive(&ClientMeta {
        accept_encoding: "gzip".to_string(),
        accept_language: "en-US".to_string(),
        ip: "10.0.0.1".to_string(),
        user_agent: format!("test-agent/{seed}"),
    })
}

/// Build a full `Arc<AppState>` around the given database.
///
/// Uses [`test_config`] and a `reqwest::Client` with proxy disabled
/// (avoids macOS system-configuration panics in sandboxed tests). Must be
/// called from within a tokio runtime.
pub fn test_state(db: Database) -> Arc<AppState> {
    test_state_with_config(db, test_config())
}

/// Like [`test_state`], but with a caller-supplied config
pub fn test_state_with_config(db: Database, config: Config) -> Arc<AppState> {
    let http_client = reqwest::Client::builder().no_proxy().build().unwrap();
    let (notifier, _task) = Notifier::spawn(config.email.clone(), http_client);
    Arc::new(AppState {
        config,
        db,
        notifier,
    })
}
