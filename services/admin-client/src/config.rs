//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! An access token can be seeded from SHOP_ADMIN_ACCESS_TOKEN; it is never
//! read from the TOML file.

use common::Secret;
use recovery::RetryPolicy;
use serde::Deserialize;
use stages::HeaderInjection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

/// Retry controller tuning, in milliseconds
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> recovery::Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            Duration::from_millis(self.max_jitter_ms),
        )
    }
}

/// Session persistence settings
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Where the session file lives. Unset keeps the session in memory only.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

fn default_timeout() -> u64 {
    15
}

fn default_refresh_path() -> String {
    session::DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_route() -> String {
    session::DEFAULT_LOGIN_ROUTE.to_string()
}

fn default_client_version() -> String {
    session::DEFAULT_CLIENT_VERSION.to_string()
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Absolute URL for a path relative to `base_url`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("SHOP_ADMIN_BASE_URL") {
            config.api.base_url = url;
        }
        if let Ok(token) = std::env::var("SHOP_ADMIN_ACCESS_TOKEN") {
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.session.access_token = Some(Secret::new(token));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.api.refresh_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "refresh_path must start with '/', got: {}",
                self.api.refresh_path
            )));
        }

        self.retry
            .policy()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_overlay() {
        unsafe {
            remove_env("SHOP_ADMIN_BASE_URL");
            remove_env("SHOP_ADMIN_ACCESS_TOKEN");
        }
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("shop-admin.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn valid_toml() -> &'static str {
        r#"
[api]
base_url = "https://api.shop.example"

[session]
storage_path = "/tmp/shop-admin-session.json"

[[headers]]
name = "x-tenant"
value = "acme"
"#
    }

    #[test]
    fn test_load_valid_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.shop.example");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.api.refresh_path, "/auth/refresh");
        assert_eq!(config.api.login_route, "/login");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers[0].name, "x-tenant");
        assert_eq!(
            config.session.storage_path,
            Some(PathBuf::from("/tmp/shop-admin-session.json"))
        );
        assert!(config.session.access_token.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/shop-admin.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_retry_section_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "http://localhost:8000"
timeout_secs = 5

[retry]
max_retries = 5
base_delay_ms = 250
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        let policy = config.retry.policy().unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_base_url_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("SHOP_ADMIN_BASE_URL", "http://127.0.0.1:9000") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://127.0.0.1:9000");
        clear_overlay();
    }

    #[test]
    fn test_access_token_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("SHOP_ADMIN_ACCESS_TOKEN", "  a.b.c\n") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.access_token.as_ref().unwrap().expose(), "a.b.c");
        clear_overlay();
    }

    #[test]
    fn test_empty_access_token_env_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("SHOP_ADMIN_ACCESS_TOKEN", "   ") };
        let config = Config::load(&path).unwrap();
        assert!(config.session.access_token.is_none());
        clear_overlay();
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"api.shop.example\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_env_base_url_is_validated_too() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("SHOP_ADMIN_BASE_URL", "ftp://nope") };
        assert!(Config::load(&path).is_err());
        clear_overlay();
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[api]\nbase_url = \"https://api.shop.example\"\ntimeout_secs = 0\n",
        );
        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_base_delay_above_max_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://api.shop.example"

[retry]
base_delay_ms = 60000
max_delay_ms = 1000
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("exceeds"), "got: {err}");
    }

    #[test]
    fn test_relative_refresh_path_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlay();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[api]\nbase_url = \"https://api.shop.example\"\nrefresh_path = \"auth/refresh\"\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = ApiConfig {
            base_url: "https://api.shop.example/".into(),
            timeout_secs: 15,
            refresh_path: default_refresh_path(),
            login_route: default_login_route(),
            client_version: default_client_version(),
        };
        assert_eq!(api.url("/contacts"), "https://api.shop.example/contacts");
        assert_eq!(api.url("contacts"), "https://api.shop.example/contacts");
    }
}
