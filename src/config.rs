//! Configuration for the odds scraper.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "Backoff::redis")]
    pub retry: Backoff,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            retry: Backoff::redis(),
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Retry schedule for connecting to a start-up dependency (milliseconds).
/// The delay doubles per attempt up to `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Backoff {
    pub fn redis() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }

    pub fn browser() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome executable; platform default when unset
    #[serde(default)]
    pub chrome_path: Option<String>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Single upstream proxy handed to Chrome as-is
    #[serde(default)]
    pub proxy_server: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "Backoff::browser")]
    pub retry: Backoff,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    1080
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            proxy_server: None,
            extra_args: Vec::new(),
            retry: Backoff::browser(),
        }
    }
}

/// Wait budgets used by the readiness gate and parsers (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timing {
    /// Market existence check
    #[serde(default = "default_market_ms")]
    pub market_ms: u64,
    /// Single cell read inside a found market
    #[serde(default = "default_cell_ms")]
    pub cell_ms: u64,
    /// Cell that is routinely absent (suspended price)
    #[serde(default = "default_optional_cell_ms")]
    pub optional_cell_ms: u64,
    /// Identifying fields (teams, date)
    #[serde(default = "default_identity_ms")]
    pub identity_ms: u64,
    /// Primary "page is loaded" beacon
    #[serde(default = "default_primary_ms")]
    pub primary_ms: u64,
    /// Pause before the recovery action
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,
    /// Beacon re-check after recovery
    #[serde(default = "default_retry_primary_ms")]
    pub retry_primary_ms: u64,
    /// Tab lookup before switching
    #[serde(default = "default_tab_ms")]
    pub tab_ms: u64,
    /// Pause after a click or scroll before reading
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_market_ms() -> u64 {
    300
}

fn default_cell_ms() -> u64 {
    500
}

fn default_optional_cell_ms() -> u64 {
    100
}

fn default_identity_ms() -> u64 {
    5000
}

fn default_primary_ms() -> u64 {
    8000
}

fn default_recovery_delay_ms() -> u64 {
    3000
}

fn default_retry_primary_ms() -> u64 {
    12000
}

fn default_tab_ms() -> u64 {
    300
}

fn default_settle_ms() -> u64 {
    100
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            market_ms: default_market_ms(),
            cell_ms: default_cell_ms(),
            optional_cell_ms: default_optional_cell_ms(),
            identity_ms: default_identity_ms(),
            primary_ms: default_primary_ms(),
            recovery_delay_ms: default_recovery_delay_ms(),
            retry_primary_ms: default_retry_primary_ms(),
            tab_ms: default_tab_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Timing {
    pub fn market(&self) -> Duration {
        Duration::from_millis(self.market_ms)
    }

    pub fn cell(&self) -> Duration {
        Duration::from_millis(self.cell_ms)
    }

    pub fn optional_cell(&self) -> Duration {
        Duration::from_millis(self.optional_cell_ms)
    }

    pub fn identity(&self) -> Duration {
        Duration::from_millis(self.identity_ms)
    }

    pub fn primary(&self) -> Duration {
        Duration::from_millis(self.primary_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    pub fn retry_primary(&self) -> Duration {
        Duration::from_millis(self.retry_primary_ms)
    }

    pub fn tab(&self) -> Duration {
        Duration::from_millis(self.tab_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Millisecond budgets for unit tests against static pages
    #[cfg(test)]
    pub fn fast() -> Self {
        Self {
            market_ms: 20,
            cell_ms: 20,
            optional_cell_ms: 10,
            identity_ms: 20,
            primary_ms: 30,
            recovery_delay_ms: 5,
            retry_primary_ms: 40,
            tab_ms: 20,
            settle_ms: 0,
        }
    }
}

/// Per-bookmaker crawl limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlLimits {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub max_requests_per_minute: Option<u32>,
}

/// Crawl loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Upper bound for one request handler
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Scroll iterations on lazily-loaded listing pages
    #[serde(default = "default_max_scroll_rounds")]
    pub max_scroll_rounds: usize,
    /// Pause after each scroll before recounting list items
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
    /// Overrides keyed by bookmaker queue name
    #[serde(default)]
    pub limits: HashMap<String, CrawlLimits>,
}

fn default_request_timeout_secs() -> u64 {
    360
}

fn default_max_scroll_rounds() -> usize {
    200
}

fn default_scroll_pause_ms() -> u64 {
    1000
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_scroll_rounds: default_max_scroll_rounds(),
            scroll_pause_ms: default_scroll_pause_ms(),
            limits: HashMap::new(),
        }
    }
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "odds_scraper=info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` wins over `level`.
    /// Logs go to stderr so that stdout carries only records.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let registry = tracing_subscriber::registry().with(filter);

        match self.format.as_str() {
            "json" => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init(),
            _ => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (ODDS_REDIS__HOST, etc.)
            .add_source(
                config::Environment::with_prefix("ODDS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
