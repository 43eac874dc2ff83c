use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for contractflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractflowConfig {
    /// Accept-invite HTTP service
    pub server: ServerConfig,
    /// Document store location
    pub store: StoreConfig,
    /// Invitation email delivery
    pub mail: MailConfig,
    /// Unread notification polling
    pub notifications: NotificationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Socket address the HTTP service binds to
    pub bind_address: String,
    /// Base URL of the web app; accepted invites redirect to `<app_url>/contracts/<id>`
    pub app_url: String,
    /// Externally reachable base URL of this service, used in accept links
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per collection
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// HTTP email API endpoint; when unset invitations are only logged
    pub api_url: Option<String>,
    /// Bearer token for the email API (can be set via env var)
    pub api_key: Option<String>,
    /// Sender address
    pub from_address: String,
    /// Outbound rate limit
    pub sends_per_minute: u32,
    /// Per request timeout
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Fixed refresh interval for unread counts
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human readable output
    pub json_logs: bool,
}

impl Default for ContractflowConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1:8787".to_string(),
                app_url: "http://localhost:3000".to_string(),
                public_url: "http://localhost:8787".to_string(),
            },
            store: StoreConfig {
                data_dir: ".contractflow/data".to_string(),
            },
            mail: MailConfig {
                api_url: None,
                api_key: None, // Will be read from env var
                from_address: "contracts@localhost".to_string(),
                sends_per_minute: 30,
                request_timeout_seconds: 15,
            },
            notifications: NotificationConfig {
                poll_interval_seconds: 30,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl ContractflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (contractflow.toml, or `path` when given)
    /// 3. Environment variables (prefixed with CONTRACTFLOW_, nested keys split on `__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("contractflow.toml").exists() {
                    builder = builder.add_source(File::with_name("contractflow"));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CONTRACTFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: ContractflowConfig = builder.build()?.try_deserialize()?;

        // Provider keys are commonly exported without the prefix
        if loaded.mail.api_key.is_none() {
            if let Ok(key) = std::env::var("MAIL_API_KEY") {
                loaded.mail.api_key = Some(key);
            }
        }

        Ok(loaded)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ContractflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ContractflowConfig::load_env_file();
        ContractflowConfig::load(None)
    });

/// Get the global configuration
pub fn config() -> Result<&'static ContractflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
