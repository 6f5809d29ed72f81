//! Client configuration.

use std::time::Duration;

use crate::error::{GridlineError, GridlineResult};

/// Default timeout applied to every dispatched request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Construction options for a [`GridlineClient`](crate::GridlineClient).
#[derive(Debug, Clone)]
pub struct GridlineConfig {
    /// Service host name.
    pub host: String,
    /// Organization segment of the namespace.
    pub org: String,
    /// Application segment of the namespace.
    pub app: String,
    /// Optional port.
    pub port: Option<u16>,
    /// Use `https` instead of `http`.
    pub use_tls: bool,
    /// Client id for the client-credentials grant.
    pub client_id: Option<String>,
    /// Client secret for the client-credentials grant.
    pub client_secret: Option<String>,
    /// Re-login automatically when the token expires.
    pub auto_reconnect: bool,
    /// Advertise gzip/deflate support on every request.
    pub use_compression: bool,
    /// Timeout applied when a call does not supply its own.
    pub default_timeout: Duration,
}

impl GridlineConfig {
    /// Create a configuration for the given namespace with defaults for
    /// everything else.
    #[must_use]
    pub fn new(host: impl Into<String>, org: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            org: org.into(),
            app: app.into(),
            port: None,
            use_tls: false,
            client_id: None,
            client_secret: None,
            auto_reconnect: false,
            use_compression: false,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Toggle TLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Set the client credentials used for login and auto-reconnect.
    #[must_use]
    pub fn with_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Toggle automatic re-login on token expiry.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Toggle compression negotiation.
    #[must_use]
    pub const fn with_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    /// Set the default request timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> GridlineResult<()> {
        for (name, value) in [("host", &self.host), ("org", &self.org), ("app", &self.app)] {
            if value.is_empty() {
                return Err(GridlineError::InvalidConfig(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_namespace_segments() {
        assert!(GridlineConfig::new("grid.example.com", "org", "app")
            .validate()
            .is_ok());
        assert!(GridlineConfig::new("", "org", "app").validate().is_err());
        assert!(GridlineConfig::new("grid.example.com", "", "app")
            .validate()
            .is_err());
        assert!(GridlineConfig::new("grid.example.com", "org", "")
            .validate()
            .is_err());
    }
}
