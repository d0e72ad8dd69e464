use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub attachment: AttachmentConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Dispatch engine settings (spec 4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Engine-wide per-dispatch timeout, in seconds. Default 30s.
    pub timeout_seconds: u64,
}

/// Attachment manager settings (spec 4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentConfig {
    /// Aggregate byte cap per request. Default 25 MiB.
    pub max_total_bytes: u64,
    /// Per-attachment fetch timeout for remote variants, in seconds. Default 30s.
    pub fetch_timeout_seconds: u64,
}

/// Scheduler loop settings (spec 4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval, in seconds. Default 10s.
    pub tick_interval_seconds: u64,
    /// InFlight queue rows older than this (seconds) are reclaimed to Pending.
    pub reclaim_window_seconds: u64,
}

/// Queue worker pool settings (spec 4.8).
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub worker_count: u32,
    pub batch_size: u32,
    pub default_max_attempts: u32,
    pub base_retry_delay_seconds: u64,
    pub max_retry_delay_seconds: u64,
    /// How often an idle worker polls for due work, in seconds.
    pub poll_interval_seconds: u64,
}

/// Rate limiter settings (spec 4.9).
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub api_key_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifyd.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            dispatch: DispatchConfig {
                timeout_seconds: env::var("DISPATCH_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            attachment: AttachmentConfig {
                max_total_bytes: env::var("ATTACHMENT_MAX_TOTAL_BYTES")
                    .unwrap_or_else(|_| (25 * 1024 * 1024).to_string())
                    .parse()
                    .unwrap_or(25 * 1024 * 1024),
                fetch_timeout_seconds: env::var("ATTACHMENT_FETCH_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            scheduler: SchedulerConfig {
                tick_interval_seconds: env::var("SCHEDULER_TICK_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                reclaim_window_seconds: env::var("SCHEDULER_RECLAIM_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
            queue: QueueConfig {
                worker_count: env::var("QUEUE_WORKER_COUNT")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4),
                batch_size: env::var("QUEUE_BATCH_SIZE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                default_max_attempts: env::var("QUEUE_DEFAULT_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                base_retry_delay_seconds: env::var("QUEUE_BASE_RETRY_DELAY_SECONDS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                max_retry_delay_seconds: env::var("QUEUE_MAX_RETRY_DELAY_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                poll_interval_seconds: env::var("QUEUE_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
            },
            rate_limit: RateLimitConfig {
                limit: env::var("RATE_LIMIT_MAX_REQUESTS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
                api_key_prefix: env::var("API_KEY_PREFIX").unwrap_or_else(|_| "ndk_".to_string()),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
            },
            dispatch: DispatchConfig {
                timeout_seconds: 30,
            },
            attachment: AttachmentConfig {
                max_total_bytes: 25 * 1024 * 1024,
                fetch_timeout_seconds: 30,
            },
            scheduler: SchedulerConfig {
                tick_interval_seconds: 10,
                reclaim_window_seconds: 300,
            },
            queue: QueueConfig {
                worker_count: 4,
                batch_size: 10,
                default_max_attempts: 5,
                base_retry_delay_seconds: 1,
                max_retry_delay_seconds: 3600,
                poll_interval_seconds: 1,
            },
            rate_limit: RateLimitConfig {
                limit: 60,
                window_seconds: 60,
            },
            auth: AuthConfig {
                jwt_secret: "dev-secret".to_string(),
                api_key_prefix: "ndk_".to_string(),
            },
        }
    }
}
