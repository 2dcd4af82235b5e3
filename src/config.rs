//! Configuration loader and validator for the calendar sync worker.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub provider: Provider,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Domain log file. Empty means `<data_dir>/calendar-sync-worker.log`.
    #[serde(default)]
    pub log_file: String,
    pub signal_poll_secs: u64,
    pub batch_limit: i64,
    pub max_attempts: i64,
}

/// External calendar provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub api_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Resolved path of the domain log file.
    pub fn log_file(&self) -> String {
        if self.app.log_file.trim().is_empty() {
            format!(
                "{}/calendar-sync-worker.log",
                self.app.data_dir.trim_end_matches('/')
            )
        } else {
            self.app.log_file.clone()
        }
    }

    /// Database URL: `DATABASE_URL` env override, else a file in the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/calsync.db", self.app.data_dir))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.signal_poll_secs == 0 {
        return Err(ConfigError::Invalid("app.signal_poll_secs must be > 0"));
    }
    if cfg.app.batch_limit <= 0 {
        return Err(ConfigError::Invalid("app.batch_limit must be > 0"));
    }
    if cfg.app.max_attempts <= 0 {
        return Err(ConfigError::Invalid("app.max_attempts must be > 0"));
    }

    if cfg.provider.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.api_base must be non-empty"));
    }
    if cfg.provider.token_url.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.token_url must be non-empty"));
    }
    if cfg.provider.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.client_id must be non-empty"));
    }
    if cfg.provider.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.client_secret must be non-empty",
        ));
    }
    if cfg.provider.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "provider.request_timeout_secs must be > 0",
        ));
    }

    Ok(())
}

/// Example YAML configuration, also used as a fixture in tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  log_file: ""
  signal_poll_secs: 4
  batch_limit: 50
  max_attempts: 5

provider:
  api_base: "https://www.googleapis.com/calendar/v3/"
  token_url: "https://oauth2.googleapis.com/token"
  client_id: "YOUR_OAUTH_CLIENT_ID"
  client_secret: "YOUR_OAUTH_CLIENT_SECRET"
  request_timeout_secs: 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_provider_fields() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.provider.client_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("client_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.provider.token_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.provider.request_timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_worker_tunables() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.batch_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.max_attempts = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn log_file_defaults_into_data_dir() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert_eq!(cfg.log_file(), "./data/calendar-sync-worker.log");

        let mut cfg = cfg;
        cfg.app.log_file = "/var/log/calsync.log".into();
        assert_eq!(cfg.log_file(), "/var/log/calsync.log");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.signal_poll_secs, 4);
        assert_eq!(cfg.app.batch_limit, 50);
    }
}
