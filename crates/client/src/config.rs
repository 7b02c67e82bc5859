//! Gateway configuration: where the two backends live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use hivegate_auth::{FileStorage, SessionError, SessionStore};

use crate::error::GatewayError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_RPC_URL: &str = "http://localhost:3000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid base URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{var} must be a whole number of seconds: {reason}")]
    InvalidTimeout { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// REST API base, e.g. `http://localhost:8080`.
    pub api_base_url: Url,
    /// RPC proxy base; distinct from the REST API.
    pub rpc_base_url: Url,
    /// Transport-level timeout. `None` leaves it to the HTTP stack.
    pub request_timeout: Option<Duration>,
    /// Directory for the persisted session; `None` means the OS data dir.
    pub session_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn new(api_base_url: &str, rpc_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url("api_base_url", api_base_url)?,
            rpc_base_url: parse_base_url("rpc_base_url", rpc_base_url)?,
            request_timeout: None,
            session_dir: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    /// Open the file-backed session store under `session_dir` and restore
    /// whatever session it holds.
    pub fn open_session_store(&self) -> Result<SessionStore, GatewayError> {
        let storage =
            FileStorage::from_config_dir(self.session_dir.clone()).map_err(SessionError::from)?;
        tracing::debug!(dir = %storage.dir().display(), "opening session storage");

        let store = SessionStore::new(Arc::new(storage));
        store.initialize();
        Ok(store)
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (the environment, a map in tests).
    ///
    /// - `HIVEGATE_API_URL` (default `http://localhost:8080`)
    /// - `HIVEGATE_RPC_URL` (default `http://localhost:3000`)
    /// - `HIVEGATE_REQUEST_TIMEOUT_SECS` (optional)
    /// - `HIVEGATE_SESSION_DIR` (optional)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = lookup("HIVEGATE_API_URL").unwrap_or_else(|| {
            tracing::warn!("HIVEGATE_API_URL not set; using {DEFAULT_API_URL}");
            DEFAULT_API_URL.to_string()
        });
        let rpc = lookup("HIVEGATE_RPC_URL").unwrap_or_else(|| {
            tracing::warn!("HIVEGATE_RPC_URL not set; using {DEFAULT_RPC_URL}");
            DEFAULT_RPC_URL.to_string()
        });

        let request_timeout = match lookup("HIVEGATE_REQUEST_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidTimeout {
                    var: "HIVEGATE_REQUEST_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?;
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            api_base_url: parse_base_url("HIVEGATE_API_URL", &api)?,
            rpc_base_url: parse_base_url("HIVEGATE_RPC_URL", &rpc)?,
            request_timeout,
            session_dir: lookup("HIVEGATE_SESSION_DIR").map(PathBuf::from),
        })
    }

    /// `{api_base_url}{path}`; `path` starts with `/`.
    pub fn api_url(&self, path: &str) -> String {
        join(&self.api_base_url, path)
    }

    /// `{rpc_base_url}{path}`; `path` starts with `/`.
    pub fn rpc_url(&self, path: &str) -> String {
        join(&self.rpc_base_url, path)
    }
}

fn parse_base_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            var,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            var,
            reason: "URL cannot be used as a base".to_string(),
        });
    }

    Ok(url)
}

fn join(base: &Url, path: &str) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), path)
}
