use config::{Config, ConfigError, Environment, File};
use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_COMMISSION_RATE: f64 = 0.10;

/// Application configuration, loaded from layered files and `APP__` env vars.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (best-effort webhook dedupe fast path)
    pub redis_url: String,

    /// JWT secret for the auth middleware
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool sizing and timeouts
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Secret for verifying payment gateway webhook signatures
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Hosted checkout gateway
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    #[serde(default)]
    pub gateway_api_key: Option<String>,

    /// Courier API
    #[serde(default = "default_courier_base_url")]
    pub courier_base_url: String,
    /// Shared key expected on inbound courier webhooks (x-api-key)
    pub courier_api_key: String,

    /// Platform commission rate withheld from vendor payouts
    #[serde(default = "default_commission_rate")]
    #[validate(custom = "validate_commission_rate")]
    pub commission_rate: f64,

    /// Timeout applied to each gateway/courier call (seconds)
    #[serde(default = "default_external_timeout_secs")]
    pub external_timeout_secs: u64,

    /// Bounded retry attempts for external calls
    #[serde(default = "default_external_retry_attempts")]
    pub external_retry_attempts: u32,

    /// Base delay for exponential backoff between retries (milliseconds)
    #[serde(default = "default_external_retry_base_ms")]
    pub external_retry_base_ms: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Settlement currency
    #[serde(default = "default_currency")]
    pub currency: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_jwt_expiration() -> u64 {
    3600
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_gateway_base_url() -> String {
    "https://gateway.example.com".to_string()
}
fn default_courier_base_url() -> String {
    "https://courier.example.com".to_string()
}
fn default_commission_rate() -> f64 {
    DEFAULT_COMMISSION_RATE
}
fn default_external_timeout_secs() -> u64 {
    10
}
fn default_external_retry_attempts() -> u32 {
    3
}
fn default_external_retry_base_ms() -> u64 {
    200
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_currency() -> String {
    "USD".to_string()
}

fn validate_commission_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate >= 1.0 {
        let mut err = ValidationError::new("commission_rate");
        err.message = Some("commission_rate must be a finite value in [0.0, 1.0)".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Programmatic constructor used by tests and tools; everything not passed
    /// takes its serde default.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        redis_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
        courier_api_key: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            gateway_base_url: default_gateway_base_url(),
            gateway_api_key: None,
            courier_base_url: default_courier_base_url(),
            courier_api_key,
            commission_rate: default_commission_rate(),
            external_timeout_secs: default_external_timeout_secs(),
            external_retry_attempts: default_external_retry_attempts(),
            external_retry_base_ms: default_external_retry_base_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            currency: default_currency(),
            cors_allowed_origins: None,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Commission rate as a Decimal; the single source of truth for
    /// settlement math.
    pub fn commission_rate_decimal(&self) -> Decimal {
        Decimal::from_f64(self.commission_rate)
            .unwrap_or_else(|| Decimal::from_f64(DEFAULT_COMMISSION_RATE).unwrap())
    }
}

/// Loads configuration from `config/default.toml`, `config/{env}.toml`, and
/// `APP__`-prefixed environment variables, in that order of precedence.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();
    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }
    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
