//! Session state: endpoints, credentials, and the token lifecycle.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::GridlineConfig;
use crate::entity::Entity;
use crate::error::{GridlineError, GridlineResult};

/// Timeout applied to every token request, independent of the configured
/// default.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT_VALUE: &str = concat!("gridline client v", env!("CARGO_PKG_VERSION"));

const CONNECT_FAILED: &str = "Failed to connect to service";

/// Authentication strategy used to obtain an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginGrant {
    /// Application client-credentials grant.
    ClientCredentials {
        /// Client id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
    /// Password grant for a named user.
    Password {
        /// User name.
        username: String,
        /// User password.
        password: String,
        /// Authenticate as this super user against the management endpoint.
        superuser: Option<String>,
        /// Requested token lifetime in seconds.
        ttl_secs: Option<u64>,
    },
}

impl LoginGrant {
    /// Client-credentials grant.
    #[must_use]
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Password grant.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
            superuser: None,
            ttl_secs: None,
        }
    }

    /// Authenticate as a super user; the login is sent to the management
    /// endpoint with the super-user name in place of the username.
    #[must_use]
    pub fn with_superuser(mut self, name: impl Into<String>) -> Self {
        if let Self::Password { superuser, .. } = &mut self {
            *superuser = Some(name.into());
        }
        self
    }

    /// Request a token lifetime in seconds.
    #[must_use]
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        if let Self::Password { ttl_secs, .. } = &mut self {
            *ttl_secs = Some(seconds);
        }
        self
    }
}

/// Grant shape of the most recent login, kept so a reconnect replays it.
#[derive(Debug, Clone, Default)]
struct LastLogin {
    superuser: Option<String>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    user: Option<Entity>,
}

/// Owns endpoint construction, credential state, and the access token.
///
/// The token and its expiry are only ever set together by a successful
/// login; direct injection via [`Session::inject_token`] clears the expiry
/// along with every reconnect capability.
#[derive(Debug)]
pub struct Session {
    base_endpoint: String,
    management_endpoint: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    access_token: Option<String>,
    token_expiry: Option<SystemTime>,
    auto_reconnect: bool,
    use_compression: bool,
    last_login: LastLogin,
    current_user: Option<Entity>,
    pub(crate) default_timeout: Duration,
}

impl Session {
    pub(crate) fn new(config: &GridlineConfig) -> Self {
        let scheme = if config.use_tls { "https" } else { "http" };
        let mut authority = format!("{scheme}://{}", config.host);
        if let Some(port) = config.port {
            authority.push_str(&format!(":{port}"));
        }

        Self {
            base_endpoint: format!("{authority}/{}/{}", config.org, config.app),
            management_endpoint: format!("{authority}/management"),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            access_token: None,
            token_expiry: None,
            auto_reconnect: config.auto_reconnect,
            use_compression: config.use_compression,
            last_login: LastLogin::default(),
            current_user: None,
            default_timeout: config.default_timeout,
        }
    }

    /// Application endpoint (`scheme://host[:port]/org/app`).
    #[must_use]
    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    /// Management endpoint (`scheme://host[:port]/management`).
    #[must_use]
    pub fn management_endpoint(&self) -> &str {
        &self.management_endpoint
    }

    /// User entity returned by the last password-grant login.
    #[must_use]
    pub fn current_user(&self) -> Option<&Entity> {
        self.current_user.as_ref()
    }

    /// Resolve a relative path against the application endpoint, stripping
    /// one leading separator.
    pub(crate) fn resolve(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{path}", self.base_endpoint)
    }

    /// Headers sent with every request.
    pub(crate) fn standard_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.access_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        if self.use_compression {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        }

        headers
    }

    /// Store an externally obtained token.
    ///
    /// An injected token is terminal: there is no expiry to check and no
    /// credentials to reauthenticate with, so every reconnect field is
    /// cleared.
    pub(crate) fn inject_token(&mut self, token: impl Into<String>) {
        self.auto_reconnect = false;
        self.client_id = None;
        self.client_secret = None;
        self.access_token = Some(token.into());
        self.current_user = None;
        self.last_login = LastLogin::default();
        self.token_expiry = None;
    }

    /// Authenticate and store the resulting token.
    pub(crate) async fn login(
        &mut self,
        http: &reqwest::Client,
        grant: &LoginGrant,
    ) -> GridlineResult<()> {
        let ttl_secs = match grant {
            LoginGrant::ClientCredentials { .. } => None,
            LoginGrant::Password { ttl_secs, .. } => *ttl_secs,
        };
        self.login_with_ttl(http, grant, ttl_secs).await
    }

    async fn login_with_ttl(
        &mut self,
        http: &reqwest::Client,
        grant: &LoginGrant,
        ttl_secs: Option<u64>,
    ) -> GridlineResult<()> {
        if ttl_secs == Some(0) {
            return Err(GridlineError::GeneralFailure(
                "ttl must be at least one second".to_string(),
            ));
        }

        let mut endpoint = &self.base_endpoint;
        let mut form: Vec<(&str, String)> = Vec::new();

        match grant {
            LoginGrant::ClientCredentials {
                client_id,
                client_secret,
            } => {
                info!("authenticating with client credentials");
                self.client_id = Some(client_id.clone());
                self.client_secret = Some(client_secret.clone());
                self.last_login = LastLogin {
                    superuser: None,
                    ttl_secs,
                };
                form.push(("grant_type", "client_credentials".to_string()));
                form.push(("client_id", client_id.clone()));
                form.push(("client_secret", client_secret.clone()));
            }
            LoginGrant::Password {
                username,
                password,
                superuser,
                ..
            } => {
                info!("authenticating with username and password");
                // No password is retained, so an expired token could never
                // be refreshed by replaying this grant.
                self.auto_reconnect = false;
                self.last_login = LastLogin {
                    superuser: superuser.clone(),
                    ttl_secs,
                };
                let username = match superuser {
                    Some(name) => {
                        info!("authenticating as super user");
                        endpoint = &self.management_endpoint;
                        name
                    }
                    None => username,
                };
                form.push(("grant_type", "password".to_string()));
                form.push(("username", username.clone()));
                form.push(("password", password.clone()));
            }
        }

        if let Some(secs) = ttl_secs {
            form.push(("ttl", (secs * 1000).to_string()));
        }

        let url = format!("{endpoint}/token");
        let response = http
            .post(&url)
            .timeout(LOGIN_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|_| GridlineError::GeneralFailure(CONNECT_FAILED.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|_| GridlineError::GeneralFailure(CONNECT_FAILED.to_string()))?;

        if body.get("error").and_then(Value::as_str) == Some("invalid_grant") {
            let detail = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or("invalid grant");
            return Err(GridlineError::LoginFailed(detail.to_string()));
        }

        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|_| GridlineError::GeneralFailure(CONNECT_FAILED.to_string()))?;

        self.access_token = Some(token.access_token);
        self.token_expiry = Some(expiry_from_now(token.expires_in));
        if matches!(grant, LoginGrant::Password { .. }) {
            self.current_user = token.user;
        }

        Ok(())
    }

    /// Check the tracked expiry before a request goes out.
    ///
    /// An injected token has no expiry and always passes. An expired token
    /// triggers one synchronous re-login when auto-reconnect is on,
    /// replaying the stored credentials and the last requested ttl.
    pub(crate) async fn ensure_token_valid(
        &mut self,
        http: &reqwest::Client,
    ) -> GridlineResult<()> {
        let Some(expiry) = self.token_expiry else {
            return Ok(());
        };

        if SystemTime::now() < expiry {
            return Ok(());
        }

        if !self.auto_reconnect {
            return Err(GridlineError::ExpiredToken(
                "Access token has expired".to_string(),
            ));
        }

        let grant = LoginGrant::ClientCredentials {
            client_id: self.client_id.clone().unwrap_or_default(),
            client_secret: self.client_secret.clone().unwrap_or_default(),
        };
        let ttl_secs = self.last_login.ttl_secs;
        self.login_with_ttl(http, &grant, ttl_secs).await
    }
}

fn expiry_from_now(expires_in: i64) -> SystemTime {
    let now = SystemTime::now();
    let delta = Duration::from_secs(expires_in.unsigned_abs());
    if expires_in >= 0 {
        now.checked_add(delta).unwrap_or(now)
    } else {
        // A token the service already considers expired.
        now.checked_sub(delta).unwrap_or(UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(config: GridlineConfig) -> Session {
        Session::new(&config)
    }

    #[test]
    fn builds_endpoints_from_namespace() {
        let plain = session(GridlineConfig::new("grid.example.com", "man", "chuck"));
        assert_eq!(plain.base_endpoint(), "http://grid.example.com/man/chuck");
        assert_eq!(
            plain.management_endpoint(),
            "http://grid.example.com/management"
        );

        let with_port = session(
            GridlineConfig::new("grid.example.com", "man", "chuck")
                .with_port(8080)
                .with_tls(true),
        );
        assert_eq!(
            with_port.base_endpoint(),
            "https://grid.example.com:8080/man/chuck"
        );
    }

    #[test]
    fn resolve_strips_one_leading_separator() {
        let session = session(GridlineConfig::new("grid.example.com", "man", "chuck"));
        assert_eq!(
            session.resolve("/users/foo"),
            "http://grid.example.com/man/chuck/users/foo"
        );
        assert_eq!(
            session.resolve("users/foo"),
            "http://grid.example.com/man/chuck/users/foo"
        );
    }

    #[test]
    fn standard_headers_reflect_token_and_compression() {
        let mut session = session(
            GridlineConfig::new("grid.example.com", "man", "chuck").with_compression(true),
        );

        let headers = session.standard_headers();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(ACCEPT_ENCODING).unwrap(), "gzip, deflate");
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("gridline client v"));

        session.inject_token("sekret");
        let headers = session.standard_headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sekret");
    }

    #[test]
    fn injected_token_clears_reconnect_state() {
        let mut session = session(
            GridlineConfig::new("grid.example.com", "man", "chuck")
                .with_credentials("id", "secret")
                .with_auto_reconnect(true),
        );
        session.token_expiry = Some(UNIX_EPOCH);

        session.inject_token("FOO-BAR-BAZ-BAT");

        assert!(!session.auto_reconnect);
        assert!(session.client_id.is_none());
        assert!(session.client_secret.is_none());
        assert!(session.token_expiry.is_none());
        assert!(session.current_user().is_none());
        assert_eq!(session.access_token.as_deref(), Some("FOO-BAR-BAZ-BAT"));
    }

    #[test]
    fn grant_builders_only_touch_password_grants() {
        let grant = LoginGrant::password("foo", "bar")
            .with_superuser("root")
            .with_ttl(60);
        assert_eq!(
            grant,
            LoginGrant::Password {
                username: "foo".to_string(),
                password: "bar".to_string(),
                superuser: Some("root".to_string()),
                ttl_secs: Some(60),
            }
        );

        let grant = LoginGrant::client_credentials("id", "secret").with_ttl(60);
        assert_eq!(
            grant,
            LoginGrant::ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            }
        );
    }

    #[test]
    fn negative_expiry_lands_in_the_past() {
        assert!(expiry_from_now(-100_000) < SystemTime::now());
        assert!(expiry_from_now(3600) > SystemTime::now());
    }
}
