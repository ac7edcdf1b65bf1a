use std::fmt;
use std::time::Duration;

use engram_core::{Result, RetryPolicy, VectorStoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where and as whom to connect.
///
/// Only these fields feed the pool key: adapters that differ solely in
/// collection name or dimension share one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Host name, optionally prefixed with `http://` or `https://`.
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, used when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            tls: false,
            api_key: None,
            api_key_env: None,
            username: None,
            password: None,
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Resolve the API key: an explicit key wins, then the named environment variable.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }
        match &self.api_key_env {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                VectorStoreError::Config(format!("environment variable '{var}' not set"))
            }),
            None => Ok(None),
        }
    }

    /// Split an optional scheme off `host`, returning `(host, tls)`.
    fn normalized_host(&self) -> (String, bool) {
        let host = self.host.trim().trim_end_matches('/');
        if let Some(rest) = host.strip_prefix("https://") {
            (rest.to_ascii_lowercase(), true)
        } else if let Some(rest) = host.strip_prefix("http://") {
            (rest.to_ascii_lowercase(), self.tls)
        } else {
            (host.to_ascii_lowercase(), self.tls)
        }
    }

    pub fn base_url(&self) -> String {
        let (host, tls) = self.normalized_host();
        let scheme = if tls { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        }
    }

    /// Canonical pool key for these parameters.
    pub fn key(&self) -> Result<ConnectionKey> {
        let (host, tls) = self.normalized_host();
        let port = self.port.unwrap_or(if tls { 443 } else { 80 });

        let api_key = self.resolve_api_key()?;
        let credentials = match (&api_key, &self.username, &self.password) {
            (None, None, None) => String::new(),
            (key, user, pass) => {
                let mut hasher = Sha256::new();
                hasher.update(key.as_deref().unwrap_or_default().as_bytes());
                hasher.update([0u8]);
                hasher.update(user.as_deref().unwrap_or_default().as_bytes());
                hasher.update([0u8]);
                hasher.update(pass.as_deref().unwrap_or_default().as_bytes());
                format!("{:x}", hasher.finalize())
            }
        };

        Ok(ConnectionKey {
            host,
            port,
            tls,
            credentials,
        })
    }
}

/// Normalized identity of a server connection.
///
/// Credentials are kept as a SHA-256 fingerprint so keys can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub credentials: String,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)?;
        if !self.credentials.is_empty() {
            write!(f, "#{}", &self.credentials[..8.min(self.credentials.len())])?;
        }
        Ok(())
    }
}

/// Per-adapter connection behaviour that does not affect the pool key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Share one client with every adapter pointed at the same server.
    #[serde(default = "default_use_pool")]
    pub use_pool: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            use_pool: default_use_pool(),
        }
    }
}

impl ConnectionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_use_pool() -> bool {
    true
}
