use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the entrance registry service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Record store selection
    #[serde(default)]
    pub store: StoreConfig,
    /// Database configuration (required when `store.backend = "postgres"`)
    pub database: Option<DatabaseConfig>,
    /// Photo object storage configuration
    #[serde(default)]
    pub photos: PhotoStorageConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Recent entries feed configuration
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Which backend holds visitors and access logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local maps, lost on restart
    Memory,
    /// PostgreSQL via sqlx
    Postgres,
}

/// Record store selection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Which backend holds visitor photos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoBackend {
    Memory,
    S3,
}

/// Photo object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoStorageConfig {
    #[serde(default = "default_photo_backend")]
    pub backend: PhotoBackend,
    /// Bucket holding visitor photos
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL under which the bucket is publicly readable (CDN, proxy)
    pub public_base_url: Option<String>,
    /// Cache-Control header set on uploaded photos
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    /// Optional key prefix, e.g. `visitor_photos`
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// API configuration for the front-desk endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Recent entries feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Seconds between background reloads
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Number of entries kept in each snapshot
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

// Default value functions
fn default_service_name() -> String {
    "entrance-registry".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_photo_backend() -> PhotoBackend {
    PhotoBackend::Memory
}

fn default_bucket() -> String {
    "photos".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_cache_control() -> String {
    "max-age=3600".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_feed_limit() -> usize {
    100
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "entrance-registry")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/entrance").required(false))
            .add_source(config::File::with_name("/etc/entrance/entrance").required(false))
            // ENTRANCE__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("ENTRANCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot start
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.database.is_none() {
            anyhow::bail!("store.backend = \"postgres\" requires a [database] section");
        }
        if self.feed.refresh_interval_secs == 0 {
            anyhow::bail!("feed.refresh_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Get the feed refresh interval as Duration
    pub fn feed_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.feed.refresh_interval_secs)
    }
}

impl DatabaseConfig {
    /// Get database connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get database idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

impl Default for PhotoStorageConfig {
    fn default() -> Self {
        Self {
            backend: default_photo_backend(),
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            public_base_url: None,
            cache_control: default_cache_control(),
            key_prefix: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            limit: default_feed_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            store: StoreConfig::default(),
            database: None,
            photos: PhotoStorageConfig::default(),
            api: ApiConfig::default(),
            feed: FeedConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_bucket(), "photos");
        assert_eq!(default_cache_control(), "max-age=3600");
        assert_eq!(default_refresh_interval_secs(), 30);
        assert_eq!(base_config().feed_refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_postgres_backend_requires_database_section() {
        let mut config = base_config();
        assert!(config.validate().is_ok());

        config.store.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let mut config = base_config();
        config.feed.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_names_deserialize() {
        let backend: StoreBackend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(backend, StoreBackend::Postgres);
        let photos: PhotoBackend = serde_json::from_str("\"s3\"").unwrap();
        assert_eq!(photos, PhotoBackend::S3);
    }
}
