use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Url;
use serde::Deserialize;

use crate::error::{ClientError, Result};

pub const DEFAULT_BASE_URL: &str = "https://localhost:7179/api";

pub const ENV_URL: &str = "BOOK_ARCHIVE_URL";
pub const ENV_TIMEOUT: &str = "BOOK_ARCHIVE_TIMEOUT";
pub const ENV_INSECURE: &str = "BOOK_ARCHIVE_INSECURE";

/// Connection settings for the archive backend. Built once and handed to
/// [`crate::BookArchiveClient::new`]; the client never changes it afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            accept_invalid_certs: false,
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ClientError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ClientError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Layers every settings source in precedence order: defaults, then the
    /// TOML file (if any), then `BOOK_ARCHIVE_*` variables, then an explicit
    /// base URL. The result is validated before it is returned.
    pub fn resolve(
        file: Option<&Path>,
        vars: &HashMap<String, String>,
        url_override: Option<&str>,
    ) -> Result<Self> {
        let config = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.layer(vars, url_override)
    }

    /// Applies the environment and an explicit base URL on top of `self`.
    pub fn layer(self, vars: &HashMap<String, String>, url_override: Option<&str>) -> Result<Self> {
        let config = self.apply_env(vars)?;
        let config = match url_override {
            Some(url) => config.with_base_url(url),
            None => config,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validated_base_url()?;
        if self.timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Overrides settings from `BOOK_ARCHIVE_*` variables.
    pub fn apply_env(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        if let Some(url) = vars.get(ENV_URL) {
            self.base_url = url.clone();
        }
        if let Some(timeout) = vars.get(ENV_TIMEOUT) {
            self.timeout_secs = match timeout.trim().parse() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ClientError::InvalidConfig(format!(
                        "{} must be a positive number of seconds, got '{}'",
                        ENV_TIMEOUT, timeout
                    )))
                }
            };
        }
        if let Some(insecure) = vars.get(ENV_INSECURE) {
            self.accept_invalid_certs = matches!(
                insecure.trim().to_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The base URL without a trailing slash, checked to be absolute http(s).
    pub fn validated_base_url(&self) -> Result<String> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        let url = Url::parse(trimmed)
            .map_err(|err| ClientError::InvalidConfig(format!("base url '{}': {}", self.base_url, err)))?;
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ClientError::InvalidConfig(format!(
                "base url '{}' must not carry a query or fragment",
                self.base_url
            )));
        }
        match url.scheme() {
            "http" | "https" => Ok(trimmed.to_string()),
            scheme => Err(ClientError::InvalidConfig(format!(
                "base url '{}' has unsupported scheme '{}'",
                self.base_url, scheme
            ))),
        }
    }

    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidConfig(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ClientError::InvalidConfig(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}
