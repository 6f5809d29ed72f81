//! Schemaless entity values, page results, and query descriptors.

use serde_json::{Map, Value};

/// An entity is an opaque JSON object; the service never enforces a schema,
/// so all field access is defensive.
pub type Entity = Map<String, Value>;

/// One page of a collection listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPage {
    /// Entities in service order.
    pub entities: Vec<Entity>,
    /// Continuation token for the next page, when the service supplied one.
    pub cursor: Option<String>,
}

/// Query options attached to a page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Query-language filter string.
    pub ql: Option<String>,
    /// Page size.
    pub limit: Option<u64>,
    /// Continuation token from a previous page.
    pub cursor: Option<String>,
}

impl Query {
    /// Create an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query-language filter.
    #[must_use]
    pub fn with_ql(mut self, ql: impl Into<String>) -> Self {
        self.ql = Some(ql.into());
        self
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the continuation cursor.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// Extract a page from a decoded list response. The service reports items
/// under `entities`, with `list` as a legacy fallback.
pub(crate) fn page_from_body(body: &Value) -> EntityPage {
    let entities = body
        .get("entities")
        .or_else(|| body.get("list"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default();

    let cursor = body
        .get("cursor")
        .and_then(Value::as_str)
        .map(str::to_owned);

    EntityPage { entities, cursor }
}

/// First entity of a decoded response, if the service returned any.
pub(crate) fn first_entity(body: &Value) -> Option<Entity> {
    body.get("entities")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .cloned()
}

/// Outgoing relationship edges recorded in an entity's metadata.
#[must_use]
pub fn connections(entity: &Entity) -> Option<&Map<String, Value>> {
    entity
        .get("metadata")
        .and_then(|metadata| metadata.get("connections"))
        .and_then(Value::as_object)
}

/// Build an activity actor from a user entity.
///
/// `displayName` prefers `name` over `username`; missing optional fields
/// default to empty strings.
#[must_use]
pub fn actor_from_user(user: &Entity) -> Entity {
    let field = |key: &str| {
        user.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    let username = field("username");
    let name = match user.get("name").and_then(Value::as_str) {
        Some(name) => name.to_owned(),
        None => username.clone(),
    };

    let mut actor = Entity::new();
    actor.insert("uuid".to_string(), Value::String(field("uuid")));
    actor.insert("displayName".to_string(), Value::String(name));
    actor.insert("username".to_string(), Value::String(username));
    actor.insert("email".to_string(), Value::String(field("email")));
    actor.insert("picture".to_string(), Value::String(field("picture")));
    actor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_entity(value: Value) -> Entity {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn page_prefers_entities_over_list() {
        let body = json!({
            "entities": [{"uuid": "a"}],
            "list": [{"uuid": "b"}],
            "cursor": "next"
        });
        let page = page_from_body(&body);
        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.entities[0]["uuid"], "a");
        assert_eq!(page.cursor.as_deref(), Some("next"));
    }

    #[test]
    fn page_falls_back_to_legacy_list() {
        let body = json!({"list": [{"uuid": "b"}]});
        let page = page_from_body(&body);
        assert_eq!(page.entities[0]["uuid"], "b");
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn connections_requires_both_keys() {
        let bare = as_entity(json!({"uuid": "x"}));
        assert!(connections(&bare).is_none());

        let no_edges = as_entity(json!({"metadata": {"path": "/users/x"}}));
        assert!(connections(&no_edges).is_none());

        let with_edges = as_entity(json!({
            "metadata": {"connections": {"owns": "/users/x/owns"}}
        }));
        let edges = connections(&with_edges).expect("edges");
        assert_eq!(edges["owns"], "/users/x/owns");
    }

    #[test]
    fn actor_prefers_name_and_defaults_optionals() {
        let user = as_entity(json!({
            "uuid": "u-1",
            "username": "chuck",
            "name": "Chuck N",
            "picture": "http://example.com/p.jpg"
        }));
        let actor = actor_from_user(&user);
        assert_eq!(actor["displayName"], "Chuck N");
        assert_eq!(actor["username"], "chuck");
        assert_eq!(actor["email"], "");
        assert_eq!(actor["picture"], "http://example.com/p.jpg");

        let minimal = as_entity(json!({"uuid": "u-2", "username": "just-a-login"}));
        let actor = actor_from_user(&minimal);
        assert_eq!(actor["displayName"], "just-a-login");
        assert_eq!(actor["picture"], "");
    }
}
