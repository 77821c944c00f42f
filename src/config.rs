use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token
    pub bot_token: String,
    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Public base URL media file paths are joined against
    pub media_base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum delivery attempts per channel
    pub max_attempts: u32,
    /// Base delay for exponential backoff (seconds)
    pub retry_base_secs: u64,
    /// Media items attached per dispatch
    pub max_media: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base_secs: 5,
            max_media: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// UAH to USD conversion rate for price normalization
    pub uah_to_usd: Decimal,
    /// Token identifying in-city addresses for City channels
    pub anchor_city: String,
    /// Place names accepted by Suburbs channels (exact match)
    pub suburbs: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            uah_to_usd: Decimal::new(4150, 2),
            anchor_city: "Львів".to_string(),
            suburbs: default_suburbs(),
        }
    }
}

fn default_suburbs() -> Vec<String> {
    [
        "Малехів",
        "Грибовичі",
        "Дубляни",
        "Сокільники",
        "Солонка",
        "Зубра",
        "Рудно",
        "Лапаївка",
        "Зимна Вода",
        "Винники",
        "Підберізці",
        "Лисиничі",
        "Давидів",
        "Підгірці",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks (seconds)
    pub tick_secs: u64,
    /// Pacing delay between consecutive dispatches (seconds)
    pub pacing_secs: u64,
    /// Interval between assignment sweeps (seconds)
    pub assign_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            pacing_secs: 60,
            assign_interval_secs: 300,
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

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("telegram.api_base", default_api_base())?
            .set_default("telegram.request_timeout_secs", 30)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ADCAST_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ADCAST_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("ADCAST")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.telegram.bot_token.trim().is_empty() {
            errors.push("telegram.bot_token must be set".to_string());
        }

        if url::Url::parse(&self.telegram.media_base_url).is_err() {
            errors.push(format!(
                "telegram.media_base_url is not a valid URL: {}",
                self.telegram.media_base_url
            ));
        }

        if self.matching.uah_to_usd <= Decimal::ZERO {
            errors.push("matching.uah_to_usd must be positive".to_string());
        }

        if self.matching.anchor_city.trim().is_empty() {
            errors.push("matching.anchor_city must be set".to_string());
        }

        if self.dispatch.max_attempts == 0 {
            errors.push("dispatch.max_attempts must be at least 1".to_string());
        }

        if self.scheduler.tick_secs == 0 || self.scheduler.pacing_secs == 0 {
            errors.push("scheduler intervals must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/adcast".to_string(),
                max_connections: 5,
            },
            telegram: TelegramConfig {
                bot_token: "123:abc".to_string(),
                api_base: default_api_base(),
                media_base_url: "https://media.rentsearch.example".to_string(),
                request_timeout_secs: 30,
            },
            dispatch: DispatchConfig::default(),
            matching: MatchingConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_default_conversion_rate() {
        assert_eq!(MatchingConfig::default().uah_to_usd, dec!(41.50));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut cfg = base_config();
        cfg.telegram.bot_token = "".to_string();
        cfg.dispatch.max_attempts = 0;
        cfg.matching.uah_to_usd = Decimal::ZERO;

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
