//! Configuration loading and validation.
//!
//! Precedence: explicit `--config` path, then `./sacristan.toml`, then
//! `~/.config/sacristan/sacristan.toml`, then built-in defaults. The base
//! URL can additionally be overridden via `SACRISTAN_BASE_URL`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: u64 = 600;
pub const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;
pub const DEFAULT_INACTIVITY_WARNING_SECS: u64 = 480;
pub const DEFAULT_INACTIVITY_LOGOUT_SECS: u64 = 600;

/// Timing policy for the session core, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub access_token_lifetime: Duration,
    /// How long before expiry the proactive refresh fires.
    pub refresh_lead_time: Duration,
    /// Inactivity span after which the warning is surfaced.
    pub inactivity_warning_delay: Duration,
    /// Inactivity span after which the session ends. Must exceed the
    /// warning delay.
    pub inactivity_logout_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(DEFAULT_ACCESS_TOKEN_LIFETIME_SECS),
            refresh_lead_time: Duration::from_secs(DEFAULT_REFRESH_LEAD_SECS),
            inactivity_warning_delay: Duration::from_secs(DEFAULT_INACTIVITY_WARNING_SECS),
            inactivity_logout_delay: Duration::from_secs(DEFAULT_INACTIVITY_LOGOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Grace period between the warning and the forced logout.
    pub fn warning_grace(&self) -> Duration {
        self.inactivity_logout_delay
            .saturating_sub(self.inactivity_warning_delay)
    }

    /// Enforce the timing invariants the scheduler and coordinator rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inactivity_logout_delay <= self.inactivity_warning_delay {
            return Err(ConfigError::Invalid(
                "inactivity_logout_secs must be greater than inactivity_warning_secs".to_string(),
            ));
        }
        if self.refresh_lead_time >= self.access_token_lifetime {
            return Err(ConfigError::Invalid(
                "refresh_lead_secs must be smaller than access_token_lifetime_secs".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend origin, without the `/api` prefix.
    pub base_url: String,
    pub http_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            session: SessionConfig::default(),
        }
    }
}

/// On-disk TOML shape. Missing fields fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    http_timeout_secs: Option<u64>,
    #[serde(default)]
    session: FileSessionConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileSessionConfig {
    access_token_lifetime_secs: Option<u64>,
    refresh_lead_secs: Option<u64>,
    inactivity_warning_secs: Option<u64>,
    inactivity_logout_secs: Option<u64>,
}

/// Default config root (`~/.config`) when resolvable.
pub fn config_root_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from `--config`).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

/// Loader with injectable file/env sources so precedence is testable
/// without touching the real filesystem.
fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<Config, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let text = match path_override {
        Some(path) => Some(read_file(Path::new(path))?),
        None => {
            let mut found = None;
            let mut candidates = vec![PathBuf::from("sacristan.toml")];
            if let Some(root) = config_root() {
                candidates.push(root.join("sacristan").join("sacristan.toml"));
            }
            for candidate in candidates {
                match read_file(&candidate) {
                    Ok(text) => {
                        found = Some(text);
                        break;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            found
        }
    };

    let parsed: FileConfig = match text {
        Some(text) => toml::from_str(&text)?,
        None => FileConfig::default(),
    };

    let defaults = Config::default();
    let session_defaults = SessionConfig::default();
    let secs = Duration::from_secs;
    let mut config = Config {
        base_url: parsed
            .base_url
            .unwrap_or(defaults.base_url)
            .trim_end_matches('/')
            .to_string(),
        http_timeout: parsed
            .http_timeout_secs
            .map(secs)
            .unwrap_or(defaults.http_timeout),
        session: SessionConfig {
            access_token_lifetime: parsed
                .session
                .access_token_lifetime_secs
                .map(secs)
                .unwrap_or(session_defaults.access_token_lifetime),
            refresh_lead_time: parsed
                .session
                .refresh_lead_secs
                .map(secs)
                .unwrap_or(session_defaults.refresh_lead_time),
            inactivity_warning_delay: parsed
                .session
                .inactivity_warning_secs
                .map(secs)
                .unwrap_or(session_defaults.inactivity_warning_delay),
            inactivity_logout_delay: parsed
                .session
                .inactivity_logout_secs
                .map(secs)
                .unwrap_or(session_defaults.inactivity_logout_delay),
        },
    };

    if let Some(url) = env_lookup("SACRISTAN_BASE_URL") {
        config.base_url = url.trim_end_matches('/').to_string();
    }

    config.session.validate()?;
    Ok(config)
}
