use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub email: EmailConfig,
    pub node: NodeConfig,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Tokens applied per approved grant request
    pub grant_amount: u64,
    /// Balance given to a newly initialized account
    pub starting_balance: u64,
    /// Upper bound on a single storage operation before it fails
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub admin_email: String,
    pub admin_url: String,
    pub from_address: String,
    /// Notification emails are disabled when unset
    pub sendgrid_api_key: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            grant_amount: 4,
            starting_balance: 4,
            write_timeout_ms: 2000,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@example.com".to_string(),
            admin_url: "http://localhost:8080/admin".to_string(),
            from_address: "noreply@example.com".to_string(),
            sendgrid_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            grant_amount: env_u64("GRANT_AMOUNT", token_defaults.grant_amount),
            starting_balance: env_u64("STARTING_BALANCE", token_defaults.starting_balance),
            write_timeout_ms: env_u64("WRITE_TIMEOUT_MS", token_defaults.write_timeout_ms),
        };

        let email_defaults = EmailConfig::default();
        let email = EmailConfig {
            admin_email: std::env::var("ADMIN_EMAIL").unwrap_or(email_defaults.admin_email),
            admin_url: std::env::var("ADMIN_URL").unwrap_or(email_defaults.admin_url),
            from_address: std::env::var("EMAIL_FROM").unwrap_or(email_defaults.from_address),
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        };

        let config = Config {
            email,
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.bind_address.is_empty() {
            return Err(ConfigError::ValidationError(
                "BIND_ADDRESS cannot be empty".to_string(),
            ));
        }
        if self.tokens.grant_amount == 0 {
            return Err(ConfigError::ValidationError(
                "GRANT_AMOUNT must be greater than 0".to_string(),
            ));
        }
        if self.tokens.write_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "WRITE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
