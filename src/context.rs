//! Connection contexts and their resolution
//!
//! A context is the fully resolved set of connection parameters used for one
//! attempt. Contexts are never mutated: every retry or reconnect derives a new
//! one from the previous context and a partial [`ConnectionOverrides`].

use crate::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Host, port and transport security of a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, is_secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            is_secure,
        }
    }

    /// URL scheme matching the security flag
    pub fn scheme(&self) -> &'static str {
        if self.is_secure {
            "https"
        } else {
            "http"
        }
    }

    /// Build the URL for a path relative to the endpoint root
    pub fn url(&self, path: &str) -> Result<Url> {
        let raw = format!(
            "{}://{}:{}/{}",
            self.scheme(),
            self.host,
            self.port,
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| Error::config(format!("Invalid URL {}: {}", raw, e)))
    }
}

/// Partial connection parameters supplied by retry/reconnect listeners.
///
/// Unset fields keep the value of the context being derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub is_secure: Option<bool>,
    pub timeout: Option<Duration>,
    pub api_key: Option<String>,
}

impl ConnectionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_secure(mut self, is_secure: bool) -> Self {
        self.is_secure = Some(is_secure);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// True when no field is overridden
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Fold a later override into this one; fields set on `later` win.
    pub fn merge(&mut self, later: ConnectionOverrides) {
        if later.host.is_some() {
            self.host = later.host;
        }
        if later.port.is_some() {
            self.port = later.port;
        }
        if later.is_secure.is_some() {
            self.is_secure = later.is_secure;
        }
        if later.timeout.is_some() {
            self.timeout = later.timeout;
        }
        if later.api_key.is_some() {
            self.api_key = later.api_key;
        }
    }
}

/// Resolve an endpoint from a base and optional overrides.
///
/// This is the only place endpoint fields are merged; both the HTTP retry
/// path and the mining reconnect path go through it.
pub fn resolve(base: &Endpoint, overrides: Option<&ConnectionOverrides>) -> Endpoint {
    let Some(overrides) = overrides else {
        return base.clone();
    };

    Endpoint {
        host: overrides.host.clone().unwrap_or_else(|| base.host.clone()),
        port: overrides.port.unwrap_or(base.port),
        is_secure: overrides.is_secure.unwrap_or(base.is_secure),
    }
}

/// Logical operation being attempted: method name plus original arguments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub name: String,
    pub args: Value,
}

impl Operation {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Resolved parameters of one HTTP dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionContext {
    #[serde(flatten)]
    endpoint: Endpoint,
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    timeout: Duration,
    attempt: u32,
    operation: Operation,
}

impl ConnectionContext {
    /// Context for the first attempt of an operation
    pub fn new(endpoint: Endpoint, timeout: Duration, operation: Operation) -> Self {
        Self {
            endpoint,
            timeout,
            attempt: 0,
            operation,
        }
    }

    /// Context for the next attempt. Unset override fields are kept and the
    /// attempt counter advances by one.
    pub fn derive(&self, overrides: &ConnectionOverrides) -> Self {
        Self {
            endpoint: resolve(&self.endpoint, Some(overrides)),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            attempt: self.attempt + 1,
            operation: self.operation.clone(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn is_secure(&self) -> bool {
        self.endpoint.is_secure
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of retries that led to this attempt (0 for the first)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

/// Resolved parameters of one stratum connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiningContext {
    #[serde(flatten)]
    endpoint: Endpoint,
    api_key: String,
    reconnect_count: u32,
}

impl MiningContext {
    pub fn new(endpoint: Endpoint, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
            reconnect_count: 0,
        }
    }

    /// Context for the next reconnect attempt
    pub fn derive(&self, overrides: &ConnectionOverrides) -> Self {
        Self {
            endpoint: resolve(&self.endpoint, Some(overrides)),
            api_key: overrides
                .api_key
                .clone()
                .unwrap_or_else(|| self.api_key.clone()),
            reconnect_count: self.reconnect_count + 1,
        }
    }

    pub(crate) fn reset_reconnect_count(&mut self) {
        self.reconnect_count = 0;
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn is_secure(&self) -> bool {
        self.endpoint.is_secure
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
