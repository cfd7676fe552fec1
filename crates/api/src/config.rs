//! Application configuration loaded from environment variables.

use domain::OrderPolicy;

/// Secret used when `JWT_SECRET` is unset. Only fit for local development.
pub const DEV_JWT_SECRET: &str = "dev-only-insecure-secret";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: Postgres connection string; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `5`)
/// - `JWT_SECRET`: token signing secret (default: a development secret)
/// - `JWT_TTL_SECS`: token lifetime (default `3600`)
/// - `RATE_LIMIT_MAX_REQUESTS`, `RATE_LIMIT_WINDOW_SECS`: per-client budget
///   (default 100 requests per 600 seconds)
/// - `LOW_STOCK_THRESHOLD`: dashboard low-stock cutoff (default `10`)
/// - `ORDER_RECOMPUTE_TOTAL`, `ORDER_ADJUST_STOCK`: order policy
///   (default `true` and `false`)
/// - `ADMIN_USERNAME`, `ADMIN_PASSWORD`: admin account seeded at startup
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: Option<String>,
    pub jwt_ttl_secs: u32,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    pub low_stock_threshold: i64,
    pub order_policy: OrderPolicy,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.parse().ok())
}

fn flag(name: &str) -> Option<bool> {
    var(name).and_then(|v| match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            jwt_secret: var("JWT_SECRET"),
            jwt_ttl_secs: parsed("JWT_TTL_SECS").unwrap_or(defaults.jwt_ttl_secs),
            rate_limit_max_requests: parsed("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or(defaults.rate_limit_max_requests),
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.rate_limit_window_secs),
            low_stock_threshold: parsed("LOW_STOCK_THRESHOLD")
                .unwrap_or(defaults.low_stock_threshold),
            order_policy: OrderPolicy {
                recompute_total: flag("ORDER_RECOMPUTE_TOTAL")
                    .unwrap_or(defaults.order_policy.recompute_total),
                adjust_stock: flag("ORDER_ADJUST_STOCK")
                    .unwrap_or(defaults.order_policy.adjust_stock),
            },
            admin_username: var("ADMIN_USERNAME"),
            admin_password: var("ADMIN_PASSWORD"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The token signing secret, falling back to the development secret.
    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or(DEV_JWT_SECRET)
    }

    /// Admin credentials, present only when both parts are set.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        Some((self.admin_username.as_deref()?, self.admin_password.as_deref()?))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            jwt_secret: None,
            jwt_ttl_secs: 3600,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 600,
            low_stock_threshold: reports::DEFAULT_LOW_STOCK_THRESHOLD,
            order_policy: OrderPolicy::default(),
            admin_username: None,
            admin_password: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database", &self.database_url.as_ref().map(|_| "postgres"))
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("low_stock_threshold", &self.low_stock_threshold)
            .field("order_policy", &self.order_policy)
            .field("admin_username", &self.admin_username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.jwt_ttl_secs, 3600);
        assert_eq!(config.rate_limit_max_requests, 100);
        assert_eq!(config.rate_limit_window_secs, 600);
        assert_eq!(config.low_stock_threshold, 10);
        assert!(config.order_policy.recompute_total);
        assert!(!config.order_policy.adjust_stock);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_jwt_secret_fallback() {
        let mut config = Config::default();
        assert_eq!(config.jwt_secret(), DEV_JWT_SECRET);
        config.jwt_secret = Some("s3cret".to_string());
        assert_eq!(config.jwt_secret(), "s3cret");
    }

    #[test]
    fn test_admin_credentials_need_both_parts() {
        let mut config = Config {
            admin_username: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(config.admin_credentials().is_none());
        config.admin_password = Some("changeme123".to_string());
        assert_eq!(config.admin_credentials(), Some(("admin", "changeme123")));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config {
            database_url: Some("postgres://u:hunter2@db/app".to_string()),
            jwt_secret: Some("top-secret".to_string()),
            admin_password: Some("pw-pw-pw-pw".to_string()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("pw-pw-pw-pw"));
    }
}
