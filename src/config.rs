use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub advisor: AdvisorConfig,
    pub targets: TargetServiceConfig,
    pub database: DatabaseConfig,
    pub activation: ActivationConfig,
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the portfolio API (e.g. "https://core.example.com")
    pub base_url: String,
    /// Value sent verbatim in the `Authorization` header
    #[serde(default)]
    pub authorization: String,
    /// Header carrying the session token on authenticated calls
    pub session_header: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub app_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetServiceConfig {
    /// Base URL of the target service
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Schema holding users, ex_api_links and pricedata_statistics
    pub name: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Deadline for one catalog call, connection acquisition included
    pub query_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationConfig {
    /// Concurrency ceiling for per-client workflows
    pub threads: usize,
    /// How often to report status while waiting for a free slot
    pub status_interval_ms: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            threads: 50,
            status_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Number of random securities in a synthesized model
    pub securities: usize,
    /// Resubmissions allowed before synthesis is abandoned
    pub max_attempts: u32,
    /// Retries for a single catalog sample that hit a storage error
    pub sample_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            securities: 10,
            max_attempts: 25,
            sample_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Environment names used by the older node scripts, mapped onto config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("CORE_API_URL", "api.base_url"),
    ("CORE_API_AUTHORIZATION", "api.authorization"),
    ("ADVISOR_EMAIL", "advisor.email"),
    ("ADVISOR_PASSWORD", "advisor.password"),
    ("TARGET_SERVICE_URL", "targets.base_url"),
    ("ADAM_DB_HOSTNAME", "database.host"),
    ("DB_USERNAME", "database.username"),
    ("DB_PASSWORD", "database.password"),
    ("DB_PORT", "database.port"),
];

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Self::defaults()?;

        // Legacy variable names sit just above the built-in defaults
        for (var, key) in LEGACY_ENV {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        let builder = builder
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AUTOPILOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AUTOPILOT__API__BASE_URL, etc.)
            .add_source(
                Environment::with_prefix("AUTOPILOT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api.base_url", "")?
            .set_default("api.authorization", "")?
            .set_default("api.session_header", "rsesh")?
            .set_default("api.request_timeout_ms", 30_000)?
            .set_default("api.user_agent", concat!("autopilot-activator/", env!("CARGO_PKG_VERSION")))?
            .set_default("advisor.email", "")?
            .set_default("advisor.password", "")?
            .set_default("advisor.app_id", 1)?
            .set_default("targets.base_url", "")?
            .set_default("targets.user_agent", concat!("autopilot-activator/", env!("CARGO_PKG_VERSION")))?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 3306)?
            .set_default("database.username", "")?
            .set_default("database.password", "")?
            .set_default("database.name", "riskalyze_adam")?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout_ms", 10_000)?
            .set_default("database.query_timeout_ms", 30_000)?
            .set_default("activation.threads", 50)?
            .set_default("activation.status_interval_ms", 5000)?
            .set_default("synthesis.securities", 10)?
            .set_default("synthesis.max_attempts", 25)?
            .set_default("synthesis.sample_retries", 3)?
            .set_default("synthesis.retry_backoff_ms", 500)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)
    }

    /// Validate what an activation run needs, reporting every problem at once
    pub fn validate_for_activation(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = url::Url::parse(&self.api.base_url) {
            errors.push(format!("api.base_url is not a valid URL ({e})"));
        }

        if let Err(e) = url::Url::parse(&self.targets.base_url) {
            errors.push(format!("targets.base_url is not a valid URL ({e})"));
        }

        if self.activation.threads == 0 {
            errors.push("activation.threads must be at least 1".to_string());
        }

        if self.synthesis.securities == 0 {
            errors.push("synthesis.securities must be at least 1".to_string());
        }

        if self.api.request_timeout_ms == 0 {
            errors.push("api.request_timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
