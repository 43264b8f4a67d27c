use std::str::FromStr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (delivery queue)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// Port the worker process serves `/metrics` on (default: 9100)
    pub metrics_port: u16,

    /// Number of concurrent delivery workers (default: 4)
    pub worker_concurrency: usize,

    /// Maximum delivery attempts per notification, first send included (default: 3)
    pub retry_max_attempts: u32,

    /// Base retry delay in seconds (default: 10)
    pub retry_base_delay_secs: u64,

    /// Exponential backoff multiplier, at least 2 (default: 2)
    pub retry_backoff_multiplier: u32,

    /// Upper bound for a single retry delay in seconds (default: 600)
    pub retry_max_delay_secs: u64,

    /// Per-attempt provider timeout in seconds (default: 30)
    pub send_timeout_secs: u64,

    /// How often an idle worker polls the queue, in milliseconds (default: 500)
    pub queue_poll_interval_ms: u64,

    /// Seconds a dequeued item stays leased before it is redelivered (default: 300)
    pub queue_visibility_timeout_secs: u64,

    /// Prefix for the Redis queue keys (default: "herald:deliveries")
    pub queue_key_prefix: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Twilio account SID for SMS delivery
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    pub twilio_auth_token: Option<String>,

    /// Twilio sender phone number
    pub twilio_from_number: Option<String>,

    /// Firebase Cloud Messaging server key for push delivery
    pub fcm_server_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: parse_env("JWT_EXPIRY_HOURS", 24)?,
            api_port: parse_env("API_PORT", 3000)?,
            metrics_port: parse_env("METRICS_PORT", 9100)?,
            worker_concurrency: parse_env("WORKER_CONCURRENCY", 4)?,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_secs: parse_env("RETRY_BASE_DELAY_SECS", 10)?,
            retry_backoff_multiplier: parse_env("RETRY_BACKOFF_MULTIPLIER", 2)?,
            retry_max_delay_secs: parse_env("RETRY_MAX_DELAY_SECS", 600)?,
            send_timeout_secs: parse_env("SEND_TIMEOUT_SECS", 30)?,
            queue_poll_interval_ms: parse_env("QUEUE_POLL_INTERVAL_MS", 500)?,
            queue_visibility_timeout_secs: parse_env("QUEUE_VISIBILITY_TIMEOUT_SECS", 300)?,
            queue_key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| "herald:deliveries".to_string()),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            twilio_account_sid: std::env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: std::env::var("TWILIO_AUTH_TOKEN").ok(),
            twilio_from_number: std::env::var("TWILIO_FROM_NUMBER").ok(),
            fcm_server_key: std::env::var("FCM_SERVER_KEY").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject retry and worker settings the delivery engine cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.retry_backoff_multiplier < 2 {
            anyhow::bail!("RETRY_BACKOFF_MULTIPLIER must be at least 2");
        }
        if self.worker_concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.send_timeout_secs == 0 {
            anyhow::bail!("SEND_TIMEOUT_SECS must be at least 1");
        }
        // A lease must outlive the attempt it covers, or the item is handed
        // to a second worker while the first is still sending.
        if self.queue_visibility_timeout_secs <= self.send_timeout_secs {
            anyhow::bail!("QUEUE_VISIBILITY_TIMEOUT_SECS must exceed SEND_TIMEOUT_SECS");
        }
        Ok(())
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn parse_env<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            anyhow::anyhow!("{} must be a valid {}", key, std::any::type_name::<T>())
        }),
        Err(_) => Ok(default),
    }
}
