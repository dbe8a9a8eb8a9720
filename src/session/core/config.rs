//! Configuration for the session engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::core::errors::{ChatError, ChatResult};

/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the service base URL.
pub const BASE_URL_ENV: &str = "CHAT_SESSION_BASE_URL";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "CHAT_SESSION_MODEL";
/// Environment variable overriding the context budget.
pub const MAX_TOKENS_ENV: &str = "CHAT_SESSION_MAX_TOKENS";
/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "CHAT_SESSION_HOME";

/// Default completion endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Context budget of the default model.
pub const DEFAULT_MAX_TOKENS: usize = 4097;

/// System message seeded into every session.
pub const SYSTEM_MESSAGE: &str =
    "You are ChatGPT, a large language model trained by OpenAI. Answer as concisely as possible.";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Completion service settings.
    pub service: ServiceConfig,
    /// Token budget settings.
    pub budget: BudgetConfig,
    /// Store location and lock settings.
    pub storage: StorageConfig,
}

impl ChatConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] if the credential is missing or a value is invalid.
    pub fn from_env() -> ChatResult<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ChatError::Config(format!(
                    "please set `{API_KEY_ENV}`; API keys are listed at https://platform.openai.com/account/api-keys"
                ))
            })?;

        let mut config = Self::default();
        config.service.api_key = api_key;
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.service.base_url = base_url;
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.service.model = model;
        }
        if let Ok(max_tokens) = std::env::var(MAX_TOKENS_ENV) {
            config.budget.max_tokens = max_tokens.parse().map_err(|_| {
                ChatError::Config(format!("{MAX_TOKENS_ENV} must be an integer, got {max_tokens}"))
            })?;
        }
        if let Ok(home) = std::env::var(HOME_ENV) {
            config.storage.data_dir = PathBuf::from(home);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.service.api_key.trim().is_empty() {
            return Err(ChatError::Config(format!("{API_KEY_ENV} must not be empty")));
        }

        if self.service.model.trim().is_empty() {
            return Err(ChatError::Config("service.model must not be empty".to_string()));
        }

        if self.budget.max_tokens == 0 {
            return Err(ChatError::Config("budget.max_tokens must be > 0".to_string()));
        }

        if self.storage.lock_retry_ms == 0 || self.storage.lock_timeout_ms == 0 {
            return Err(ChatError::Config(
                "storage lock timings must be > 0".to_string(),
            ));
        }

        Url::parse(&self.service.base_url)?;
        Ok(())
    }
}

/// Completion service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bearer credential.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Endpoint root; `/chat/completions` is appended.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Optional connect timeout. Requests themselves have no client-side timeout.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout_secs: None,
        }
    }
}

/// Token budget settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum estimated tokens accepted before a split.
    pub max_tokens: usize,
    /// System message seeded at position 0 of every request.
    pub system_message: String,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            system_message: SYSTEM_MESSAGE.to_string(),
        }
    }
}

/// Store location and lock settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the history file.
    pub data_dir: PathBuf,
    /// History file name inside `data_dir`.
    pub db_file: String,
    /// How long to keep retrying the exclusivity lock.
    pub lock_timeout_ms: u64,
    /// Interval between lock attempts.
    pub lock_retry_ms: u64,
}

impl StorageConfig {
    /// Full path of the backing file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    /// Lock timeout as a duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Lock retry interval as a duration.
    #[must_use]
    pub const fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: home.join(".chatgpt"),
            db_file: "history.db".to_string(),
            lock_timeout_ms: 1_000,
            lock_retry_ms: 50,
        }
    }
}
