use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DELIVERY_FEE: f64 = 10.0;
const DEFAULT_FREE_DELIVERY_THRESHOLD: f64 = 50.0;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Checkout policy knobs.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CheckoutConfig {
    /// Flat delivery fee applied below the free-delivery threshold
    #[serde(default = "default_delivery_fee")]
    pub delivery_fee: f64,

    /// Order subtotal at or above which delivery is free
    #[serde(default = "default_free_delivery_threshold")]
    pub free_delivery_threshold: f64,

    /// Whether placing an order empties the cart it was checked out from.
    /// Off by default: the cart survives placement and supports re-ordering.
    #[serde(default)]
    pub clear_cart_after_checkout: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            delivery_fee: default_delivery_fee(),
            free_delivery_threshold: default_free_delivery_threshold(),
            clear_cart_after_checkout: false,
        }
    }
}

/// Payment gateway settings. The callback secret authenticates inbound
/// confirmation callbacks; the gateway_* fields configure the outbound
/// order-creation client and are optional (unset disables the outbound call).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    #[validate(length(min = 16))]
    pub callback_secret: String,

    #[serde(default)]
    pub gateway_base_url: Option<String>,
    #[serde(default)]
    pub gateway_key_id: Option<String>,
    #[serde(default)]
    pub gateway_key_secret: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Bound on every outbound gateway call
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Secret used to verify bearer tokens issued by the identity service
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Whether to create missing tables on startup (dev/sqlite convenience)
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,

    #[validate]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests and embedded setups; everything not
    /// passed in takes its default.
    pub fn new(
        database_url: impl Into<String>,
        jwt_secret: impl Into<String>,
        callback_secret: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            jwt_secret: jwt_secret.into(),
            db_max_connections: 1,
            db_min_connections: 1,
            auto_migrate: true,
            checkout: CheckoutConfig::default(),
            payment: PaymentConfig {
                callback_secret: callback_secret.into(),
                gateway_base_url: None,
                gateway_key_id: None,
                gateway_key_secret: None,
                currency: default_currency(),
                request_timeout_secs: default_gateway_timeout_secs(),
            },
        }
    }
}

/// Loads configuration from layered files (`config/default.toml`, then
/// `config/{environment}.toml`) and `APP_`-prefixed environment variables,
/// then validates the result.
pub fn load_config() -> Result<AppConfig, ConfigurationError> {
    let environment =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigurationError::Validation(e.to_string()))?;

    info!(
        environment = %config.environment,
        host = %config.host,
        port = config.port,
        "Configuration loaded"
    );

    Ok(config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
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

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_delivery_fee() -> f64 {
    DEFAULT_DELIVERY_FEE
}

fn default_free_delivery_threshold() -> f64 {
    DEFAULT_FREE_DELIVERY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_applies_defaults() {
        let cfg = AppConfig::new(
            "sqlite://test.db?mode=rwc",
            "test_secret_key_for_testing_purposes_only_32chars",
            "callback_secret_for_tests",
        );

        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.checkout.delivery_fee, DEFAULT_DELIVERY_FEE);
        assert!(!cfg.checkout.clear_cart_after_checkout);
        assert_eq!(cfg.payment.currency, DEFAULT_CURRENCY);
        assert!(cfg.payment.gateway_base_url.is_none());
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let cfg = AppConfig::new("sqlite://test.db", "short", "callback_secret_for_tests");
        assert!(cfg.validate().is_err());
    }
}
