//! HTTP client implementation.

use std::path::Path;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::api::EntityApi;
use crate::config::GridlineConfig;
use crate::entity::{first_entity, page_from_body, Entity, EntityPage, Query};
use crate::error::{GridlineError, GridlineResult};
use crate::session::{LoginGrant, Session};

/// Timeout override for multipart uploads.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-request options threaded through the dispatcher.
#[derive(Default)]
struct RequestOptions {
    query: Vec<(&'static str, String)>,
    json: Option<Value>,
    multipart: Option<Form>,
    timeout: Option<Duration>,
    headers: HeaderMap,
}

impl RequestOptions {
    fn with_query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    fn with_json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    fn with_multipart(mut self, form: Form) -> Self {
        self.multipart = Some(form);
        self
    }

    const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client for a Gridline entity service.
///
/// Every operation takes `&mut self`: the session token is the only mutable
/// state and exclusive access makes the single-reconnect-per-call rule hold
/// without locking. Calls are strictly sequential: one request in flight at
/// a time, including during pagination and archival.
#[derive(Debug)]
pub struct GridlineClient {
    http: reqwest::Client,
    session: Session,
}

impl GridlineClient {
    /// Build a client from validated configuration.
    pub fn new(config: GridlineConfig) -> GridlineResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| GridlineError::InvalidConfig(format!("http client: {err}")))?;
        Ok(Self {
            http,
            session: Session::new(&config),
        })
    }

    /// Session state (endpoints, current user).
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// User entity returned by the last password-grant login.
    #[must_use]
    pub fn current_user(&self) -> Option<&Entity> {
        self.session.current_user()
    }

    /// Authenticate with the service and store the resulting token.
    pub async fn login(&mut self, grant: &LoginGrant) -> GridlineResult<()> {
        self.session.login(&self.http, grant).await
    }

    /// Inject an externally obtained access token.
    ///
    /// The token carries no refresh capability: credentials, reconnect state,
    /// and the tracked expiry are all cleared.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.session.inject_token(token);
    }

    /// Single choke point for every outbound request.
    ///
    /// Re-authentication happens here, before the request is issued, never
    /// as a retry around the transport call; a request is dispatched at
    /// most once per invocation.
    async fn dispatch(
        &mut self,
        method: Method,
        url: String,
        options: RequestOptions,
    ) -> GridlineResult<Value> {
        self.session.ensure_token_valid(&self.http).await?;

        let timeout = options.timeout.unwrap_or(self.session.default_timeout);
        let headers = merged_headers(self.session.standard_headers(), &options.headers);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(timeout)
            .headers(headers);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.json {
            request = request.json(body);
        }
        if let Some(form) = options.multipart {
            request = request.multipart(form);
        }

        let response = request.send().await.map_err(|err| {
            error!(%url, error = %err, "request failed");
            GridlineError::GeneralFailure(format!("request failed: {err}"))
        })?;

        let status = response.status();
        debug!(%method, status = status.as_u16(), %url, "dispatched");

        let bytes = response.bytes().await.map_err(|err| {
            error!(%url, error = %err, "failed to read response body");
            GridlineError::GeneralFailure(format!("failed to read response body: {err}"))
        })?;

        let body: Value = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(err) => {
                error!(%url, error = %err, "response body is not JSON");
                return Err(err.into());
            }
        };

        if body.get("exception").is_none() {
            return Ok(body);
        }

        let err = service_error(&body);
        error!(%url, error = %err, "service reported an error");
        Err(err)
    }

    /// Fetch one entity by collection and id.
    ///
    /// Unlike [`EntityApi::get_entity`], a missing resource surfaces as an
    /// error here; callers wanting tolerance wrap the result in
    /// [`or_not_found`](crate::or_not_found).
    pub async fn get_entity_by_id(
        &mut self,
        collection: &str,
        entity_id: &str,
    ) -> GridlineResult<Option<Entity>> {
        let url = self.session.resolve(&format!("{collection}/{entity_id}"));
        let body = self
            .dispatch(Method::GET, url, RequestOptions::default())
            .await?;
        Ok(first_entity(&body))
    }

    /// DELETE an endpoint, returning the decoded response.
    pub async fn delete_entity(&mut self, endpoint: &str) -> GridlineResult<Value> {
        let url = self.session.resolve(endpoint);
        self.dispatch(Method::DELETE, url, RequestOptions::default())
            .await
    }

    /// DELETE one entity by collection and id.
    pub async fn delete_entity_by_id(
        &mut self,
        collection: &str,
        entity_id: &str,
    ) -> GridlineResult<Value> {
        self.delete_entity(&format!("{collection}/{entity_id}"))
            .await
    }

    /// Create an entity, returning the stored form.
    pub async fn post_entity(&mut self, endpoint: &str, data: &Value) -> GridlineResult<Entity> {
        let url = self.session.resolve(endpoint);
        let body = self
            .dispatch(
                Method::POST,
                url,
                RequestOptions::default().with_json(data.clone()),
            )
            .await?;
        stored_entity(&body)
    }

    /// Update an entity, returning the stored form.
    pub async fn update_entity(&mut self, endpoint: &str, data: &Value) -> GridlineResult<Entity> {
        let url = self.session.resolve(endpoint);
        let body = self
            .dispatch(
                Method::PUT,
                url,
                RequestOptions::default().with_json(data.clone()),
            )
            .await?;
        stored_entity(&body)
    }

    /// Update one entity by collection and id.
    pub async fn update_entity_by_id(
        &mut self,
        collection: &str,
        entity_id: &str,
        data: &Value,
    ) -> GridlineResult<Entity> {
        self.update_entity(&format!("{collection}/{entity_id}"), data)
            .await
    }

    /// Record an activity for an actor. Extra fields are merged into the
    /// payload; the raw response is returned without unwrapping.
    pub async fn post_activity(
        &mut self,
        endpoint: &str,
        actor: &Value,
        verb: &str,
        content: &str,
        extra: Option<&Entity>,
    ) -> GridlineResult<Value> {
        let mut payload = Entity::new();
        payload.insert("actor".to_string(), actor.clone());
        payload.insert("verb".to_string(), Value::String(verb.to_string()));
        payload.insert("content".to_string(), Value::String(content.to_string()));
        if let Some(extra) = extra {
            for (key, value) in extra {
                payload.insert(key.clone(), value.clone());
            }
        }

        let url = self.session.resolve(endpoint);
        self.dispatch(
            Method::POST,
            url,
            RequestOptions::default().with_json(Value::Object(payload)),
        )
        .await
    }

    /// Create a relationship edge (bodyless POST).
    pub async fn post_relationship(&mut self, endpoint: &str) -> GridlineResult<Value> {
        let url = self.session.resolve(endpoint);
        self.dispatch(Method::POST, url, RequestOptions::default())
            .await
    }

    /// Remove a relationship edge (bodyless DELETE).
    pub async fn delete_relationship(&mut self, endpoint: &str) -> GridlineResult<Value> {
        let url = self.session.resolve(endpoint);
        self.dispatch(Method::DELETE, url, RequestOptions::default())
            .await
    }

    /// Upload a file as a multipart request with a five-minute timeout.
    pub async fn post_file(&mut self, endpoint: &str, filepath: &Path) -> GridlineResult<Value> {
        let name = filepath
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                GridlineError::GeneralFailure(format!(
                    "invalid upload path: {}",
                    filepath.display()
                ))
            })?;

        let bytes = tokio::fs::read(filepath).await?;
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name.clone()))
            .text("name", name);

        let url = self.session.resolve(endpoint);
        self.dispatch(
            Method::POST,
            url,
            RequestOptions::default()
                .with_multipart(form)
                .with_timeout(UPLOAD_TIMEOUT),
        )
        .await
    }

    /// Change a user's password. A service-reported failure is surfaced
    /// under the password-update category.
    pub async fn update_user_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> GridlineResult<Value> {
        let url = self.session.resolve(&format!("users/{username}/password"));
        let body = json!({
            "oldpassword": old_password,
            "newpassword": new_password,
        });
        match self
            .dispatch(Method::PUT, url, RequestOptions::default().with_json(body))
            .await
        {
            Err(GridlineError::Service { detail, .. }) => {
                Err(GridlineError::PasswordUpdateFailed(detail))
            }
            other => other,
        }
    }
}

impl EntityApi for GridlineClient {
    async fn get_entities(&mut self, endpoint: &str, query: &Query) -> GridlineResult<EntityPage> {
        let mut params = Vec::new();
        if let Some(ql) = &query.ql {
            params.push(("ql", ql.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = &query.cursor {
            params.push(("cursor", cursor.clone()));
        }

        let url = self.session.resolve(endpoint);
        match self
            .dispatch(Method::GET, url, RequestOptions::default().with_query(params))
            .await
        {
            Ok(body) => Ok(page_from_body(&body)),
            Err(err) if err.is_not_found() => Ok(EntityPage::default()),
            Err(err) => Err(err),
        }
    }
}

/// Standard headers form the base layer; per-request headers win on
/// conflicting keys.
fn merged_headers(standard: HeaderMap, extra: &HeaderMap) -> HeaderMap {
    let mut headers = standard;
    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

fn service_error(body: &Value) -> GridlineError {
    let detail = body
        .get("error_description")
        .and_then(Value::as_str)
        .unwrap_or("Unknown service error")
        .to_string();

    match body.get("error").and_then(Value::as_str) {
        None => GridlineError::GeneralFailure(detail),
        // The service noticed the expiry before the client did; fold both
        // paths into one category.
        Some("expired_token") => GridlineError::ExpiredToken(detail),
        Some(category) => GridlineError::Service {
            category: category.to_string(),
            detail,
        },
    }
}

fn stored_entity(body: &Value) -> GridlineResult<Entity> {
    first_entity(body).ok_or_else(|| {
        GridlineError::GeneralFailure("service returned no entities".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, ACCEPT};
    use serde_json::json;

    #[test]
    fn caller_headers_override_the_standard_layer() {
        let mut standard = HeaderMap::new();
        standard.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut extra = HeaderMap::new();
        extra.insert(ACCEPT, HeaderValue::from_static("text/csv"));

        let merged = merged_headers(standard, &extra);
        assert_eq!(merged.get(ACCEPT).unwrap(), "text/csv");
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn service_error_classification() {
        let not_found = service_error(&json!({
            "exception": "NotFoundException",
            "error": "service_resource_not_found",
            "error_description": "Service resource not found"
        }));
        assert!(not_found.is_not_found());

        let expired = service_error(&json!({
            "exception": "ExpiredTokenException",
            "error": "expired_token",
            "error_description": "Unable to authenticate due to expired access token"
        }));
        assert!(matches!(expired, GridlineError::ExpiredToken(_)));

        let unclassified = service_error(&json!({"exception": "Boom"}));
        assert_eq!(
            unclassified.to_string(),
            "general_failure: Unknown service error"
        );
    }

    #[test]
    fn stored_entity_requires_a_populated_list() {
        let body = json!({"entities": [{"uuid": "x"}]});
        assert_eq!(stored_entity(&body).unwrap()["uuid"], "x");

        let empty = json!({"entities": []});
        assert!(stored_entity(&empty).is_err());
    }
}
