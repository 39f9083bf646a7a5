use anyhow::{Context, Result};

mod logging;

pub use logging::{LogFormat, LoggingConfig};

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Upstream exchanges are bounded by this timeout (seconds)
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// 100 requests per API key per hour
const DEFAULT_RATE_LIMIT_REQUESTS: u64 = 100;
pub const SECONDS_PER_HOUR: u64 = 3600;

pub const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024; // 10 MB

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

/// Per-key throttling configuration
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Requests admitted per key within one window
    pub max_requests: u64,
    /// Fixed window length in seconds; also the TTL of the counter
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            window_secs: SECONDS_PER_HOUR,
        }
    }
}

/// Upstream forwarding configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub upstream_timeout_secs: u64,
    pub max_request_body_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            max_request_body_size: MAX_REQUEST_BODY_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,
    pub logging: LoggingConfig,
    pub db: DbConfig,
    pub rate_limit: RateLimitConfig,
    pub proxy: ProxyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: std::env::var("REDIS_URL").context("REDIS_URL must be set")?,
            port: env_or("PORT", DEFAULT_PORT),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            logging: LoggingConfig::from_env()?,
            db: DbConfig {
                max_connections: env_or("DB_MAX_CONNECTIONS", 10),
                acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 30),
                idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 600),
            },
            rate_limit: RateLimitConfig {
                max_requests: env_or("RATE_LIMIT_REQUESTS", DEFAULT_RATE_LIMIT_REQUESTS),
                window_secs: env_or("RATE_LIMIT_WINDOW_SECS", SECONDS_PER_HOUR),
            },
            proxy: ProxyConfig {
                upstream_timeout_secs: env_or(
                    "UPSTREAM_TIMEOUT_SECS",
                    DEFAULT_UPSTREAM_TIMEOUT_SECS,
                ),
                max_request_body_size: env_or("MAX_REQUEST_BODY_SIZE", MAX_REQUEST_BODY_SIZE),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Reads and parses an env var, falling back to `default` when unset or malformed
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_match_gateway_contract() {
        let rate = RateLimitConfig::default();
        assert_eq!(rate.max_requests, 100);
        assert_eq!(rate.window_secs, 3600);

        let proxy = ProxyConfig::default();
        assert_eq!(proxy.upstream_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("GATEWAY_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("GATEWAY_TEST_NUMBER", 42u64), 42);

        std::env::set_var("GATEWAY_TEST_NUMBER", " 7 ");
        assert_eq!(env_or("GATEWAY_TEST_NUMBER", 42u64), 7);

        std::env::remove_var("GATEWAY_TEST_NUMBER");
        assert_eq!(env_or("GATEWAY_TEST_NUMBER", 42u64), 42);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://gw:gw@localhost:5432/gateway");
        std::env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        std::env::set_var("LOG_HASH_SALT", "test-salt-0123456789");
        std::env::set_var("RATE_LIMIT_REQUESTS", "5");
        std::env::set_var("UPSTREAM_TIMEOUT_SECS", "3");

        let config = Config::from_env().unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.proxy.upstream_timeout_secs, 3);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");

        for var in [
            "DATABASE_URL",
            "REDIS_URL",
            "LOG_HASH_SALT",
            "RATE_LIMIT_REQUESTS",
            "UPSTREAM_TIMEOUT_SECS",
        ] {
            std::env::remove_var(var);
        }
    }
}
