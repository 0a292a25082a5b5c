use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::http::Endpoint;

pub const DEFAULT_CONFIG_PATH: &str = "moviesearch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("no API key configured; set api_key, OMDB_API_KEY or APP__API_KEY")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Which response wins when searches overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseOrdering {
    /// Responses to anything but the most recent search are discarded.
    #[default]
    LatestRequest,
    /// Every response is applied as it arrives; the last to arrive wins.
    LastArrival,
}

impl FromStr for ResponseOrdering {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "latest_request" => Ok(Self::LatestRequest),
            "last_arrival" => Ok(Self::LastArrival),
            _ => Err(ConfigError::InvalidValue {
                key: "response_ordering",
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResponseOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestRequest => f.write_str("latest_request"),
            Self::LastArrival => f.write_str("last_arrival"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    pub default_term: String,
    pub response_ordering: ResponseOrdering,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://www.omdbapi.com/".into(),
            api_key: String::new(),
            timeout_seconds: 10,
            default_term: "Dune".into(),
            response_ordering: ResponseOrdering::LatestRequest,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::new(&self.base_url, &self.api_key)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
    default_term: Option<String>,
    response_ordering: Option<String>,
}

/// Loads settings from `path` (or `moviesearch.toml` in the working
/// directory) and the process environment. A missing file is not an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let raw = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    settings_from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Layers defaults, file contents and environment lookups, in that order.
pub fn settings_from_sources(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.base_url {
            settings.base_url = v;
        }
        if let Some(v) = file_cfg.api_key {
            settings.api_key = v;
        }
        if let Some(v) = file_cfg.timeout_seconds {
            settings.timeout_seconds = v;
        }
        if let Some(v) = file_cfg.default_term {
            settings.default_term = v;
        }
        if let Some(v) = file_cfg.response_ordering {
            settings.response_ordering = v.parse()?;
        }
    }

    if let Some(v) = env("OMDB_API_KEY") {
        settings.api_key = v;
    }
    if let Some(v) = env("APP__API_KEY") {
        settings.api_key = v;
    }

    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("APP__TIMEOUT_SECONDS") {
        settings.timeout_seconds = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "timeout_seconds",
            value: v.clone(),
        })?;
    }

    if let Some(v) = env("APP__DEFAULT_TERM") {
        settings.default_term = v;
    }

    if let Some(v) = env("APP__RESPONSE_ORDERING") {
        settings.response_ordering = v.parse()?;
    }

    if settings.timeout_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            key: "timeout_seconds",
            value: "0".into(),
        });
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
