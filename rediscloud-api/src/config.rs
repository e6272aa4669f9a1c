//! Client and polling configuration

use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the API base URL
pub const URL_ENV: &str = "REDISCLOUD_URL";
/// Environment variable holding the account access key
pub const ACCESS_KEY_ENV: &str = "REDISCLOUD_ACCESS_KEY";
/// Environment variable holding the account secret key
pub const SECRET_KEY_ENV: &str = "REDISCLOUD_SECRET_KEY";

/// Errors raised while assembling configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVariable(&'static str),

    #[error("Invalid {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Connection settings for the Redis Cloud REST API
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub user_agent: String,
    /// Per-request timeout applied by the HTTP transport
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_URL: &'static str = "https://api.redislabs.com/v1";

    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_URL.to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            user_agent: concat!("rediscloud-provider/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Build from `REDISCLOUD_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let access_key =
            non_empty(ACCESS_KEY_ENV).ok_or(ConfigError::MissingVariable(ACCESS_KEY_ENV))?;
        let secret_key =
            non_empty(SECRET_KEY_ENV).ok_or(ConfigError::MissingVariable(SECRET_KEY_ENV))?;

        let config = Self::new(access_key, secret_key);
        match non_empty(URL_ENV) {
            Some(url) => config.with_base_url(url),
            None => Ok(config),
        }
    }

    /// Override the API base URL; must be an absolute http(s) URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        let parsed = url::Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            name: URL_ENV,
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: URL_ENV,
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Backoff bounds for task polling
///
/// The attempt count is unbounded; a wait ends on success, on an
/// unrecoverable classification or when the caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPollConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for the doubling delay
    pub max_delay: Duration,
}

impl Default for TaskPollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn from_lookup_uses_default_url() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ACCESS_KEY_ENV, "access"),
            (SECRET_KEY_ENV, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, ClientConfig::DEFAULT_URL);
        assert_eq!(config.access_key, "access");
        assert_eq!(config.secret_key, "secret");
    }

    #[test]
    fn from_lookup_reports_missing_variable() {
        let err = ClientConfig::from_lookup(lookup(&[(ACCESS_KEY_ENV, "access")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(SECRET_KEY_ENV)));
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: REDISCLOUD_SECRET_KEY"
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ACCESS_KEY_ENV, "  "),
            (SECRET_KEY_ENV, "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(ACCESS_KEY_ENV)));
    }

    #[test]
    fn base_url_override_is_validated() {
        let config = ClientConfig::new("a", "s")
            .with_base_url("http://localhost:8080/v1/")
            .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/v1");

        assert!(ClientConfig::new("a", "s").with_base_url("not a url").is_err());
        assert!(ClientConfig::new("a", "s").with_base_url("ftp://host/v1").is_err());
    }

    #[test]
    fn default_poll_bounds() {
        let poll = TaskPollConfig::default();
        assert_eq!(poll.initial_delay, Duration::from_secs(1));
        assert_eq!(poll.max_delay, Duration::from_secs(30));
    }
}
