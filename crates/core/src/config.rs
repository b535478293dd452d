use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::levels::CurrencyRates;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub mailer: MailerConfig,
    pub currency: CurrencyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// How long a connection waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MailerConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CurrencyConfig {
    /// EUR-per-unit rates keyed by currency code; EUR is implicit.
    pub rates: HashMap<String, Decimal>,
    /// Edit tokens expire after this many hours.
    pub edit_token_ttl_hours: u64,
}

impl CurrencyConfig {
    pub fn currency_rates(&self) -> CurrencyRates {
        CurrencyRates::new(self.rates.clone())
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub mailer_enabled: Option<bool>,
    pub mailer_base_url: Option<String>,
    pub mailer_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://freightgate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                busy_timeout_ms: 5_000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8090,
                health_check_port: 8091,
                graceful_shutdown_secs: 15,
            },
            mailer: MailerConfig { enabled: false, base_url: None, api_key: None, timeout_secs: 10 },
            currency: CurrencyConfig {
                rates: HashMap::from([
                    ("USD".to_string(), Decimal::new(92, 2)),
                    ("MXN".to_string(), Decimal::new(5, 2)),
                ]),
                edit_token_ttl_hours: 72,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("freightgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(busy_timeout_ms) = database.busy_timeout_ms {
                self.database.busy_timeout_ms = busy_timeout_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(mailer) = patch.mailer {
            if let Some(enabled) = mailer.enabled {
                self.mailer.enabled = enabled;
            }
            if let Some(base_url) = mailer.base_url {
                self.mailer.base_url = Some(base_url);
            }
            if let Some(api_key_value) = mailer.api_key {
                self.mailer.api_key = Some(api_key_value.into());
            }
            if let Some(timeout_secs) = mailer.timeout_secs {
                self.mailer.timeout_secs = timeout_secs;
            }
        }

        if let Some(currency) = patch.currency {
            if let Some(rates) = currency.rates {
                self.currency.rates = parse_rates(rates)?;
            }
            if let Some(ttl) = currency.edit_token_ttl_hours {
                self.currency.edit_token_ttl_hours = ttl;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FREIGHTGATE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FREIGHTGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FREIGHTGATE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTGATE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FREIGHTGATE_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTGATE_DATABASE_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms =
                parse_u64("FREIGHTGATE_DATABASE_BUSY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("FREIGHTGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FREIGHTGATE_SERVER_PORT") {
            self.server.port = parse_u16("FREIGHTGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FREIGHTGATE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("FREIGHTGATE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("FREIGHTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FREIGHTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("FREIGHTGATE_MAILER_ENABLED") {
            self.mailer.enabled = parse_bool("FREIGHTGATE_MAILER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FREIGHTGATE_MAILER_BASE_URL") {
            self.mailer.base_url = Some(value);
        }
        if let Some(value) = read_env("FREIGHTGATE_MAILER_API_KEY") {
            self.mailer.api_key = Some(value.into());
        }
        if let Some(value) = read_env("FREIGHTGATE_MAILER_TIMEOUT_SECS") {
            self.mailer.timeout_secs = parse_u64("FREIGHTGATE_MAILER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FREIGHTGATE_EDIT_TOKEN_TTL_HOURS") {
            self.currency.edit_token_ttl_hours =
                parse_u64("FREIGHTGATE_EDIT_TOKEN_TTL_HOURS", &value)?;
        }

        let log_level =
            read_env("FREIGHTGATE_LOGGING_LEVEL").or_else(|| read_env("FREIGHTGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FREIGHTGATE_LOGGING_FORMAT").or_else(|| read_env("FREIGHTGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.mailer_enabled {
            self.mailer.enabled = enabled;
        }
        if let Some(base_url) = overrides.mailer_base_url {
            self.mailer.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.mailer_api_key {
            self.mailer.api_key = Some(api_key.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_mailer(&self.mailer)?;
        validate_currency(&self.currency)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("freightgate.toml"), PathBuf::from("config/freightgate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_rates(raw: HashMap<String, f64>) -> Result<HashMap<String, Decimal>, ConfigError> {
    raw.into_iter()
        .map(|(currency, rate)| {
            Decimal::from_f64_retain(rate)
                .filter(|rate| !rate.is_sign_negative())
                .map(|rate| (currency.to_ascii_uppercase(), rate))
                .ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "currency.rates entry `{currency}` must be a non-negative number"
                    ))
                })
        })
        .collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if database.busy_timeout_ms == 0 || database.busy_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "database.busy_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_mailer(mailer: &MailerConfig) -> Result<(), ConfigError> {
    if mailer.enabled {
        let base_url = mailer.base_url.as_deref().unwrap_or("").trim();
        if base_url.is_empty() {
            return Err(ConfigError::Validation(
                "mailer.enabled is true but mailer.base_url is not set".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "mailer.base_url must start with http:// or https://".to_string(),
            ));
        }

        let missing_key = mailer
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "mailer.enabled is true but mailer.api_key is not set".to_string(),
            ));
        }
    }

    if mailer.timeout_secs == 0 || mailer.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "mailer.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_currency(currency: &CurrencyConfig) -> Result<(), ConfigError> {
    if currency.edit_token_ttl_hours == 0 {
        return Err(ConfigError::Validation(
            "currency.edit_token_ttl_hours must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    mailer: Option<MailerPatch>,
    currency: Option<CurrencyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MailerPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrencyPatch {
    rates: Option<HashMap<String, f64>>,
    edit_token_ttl_hours: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
