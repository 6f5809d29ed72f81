//! In-memory stand-in for offline tests.
//!
//! Replays pre-recorded pages keyed by the exact fetch that would have gone
//! over the wire. Each instance owns its own table, so parallel tests never
//! observe each other's recordings.

use std::collections::HashMap;

use serde_json::Value;

use crate::api::EntityApi;
use crate::entity::{Entity, EntityPage, Query};
use crate::error::{GridlineError, GridlineResult};

/// Composite lookup key for one recorded page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Collection path as the caller passes it.
    pub endpoint: String,
    /// Query-language filter, when the fetch carries one.
    pub ql: Option<String>,
    /// Requested page size.
    pub limit: Option<u64>,
    /// Continuation cursor, `None` for the first page.
    pub cursor: Option<String>,
}

impl PageKey {
    /// Key for a plain first-page fetch.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ql: None,
            limit: None,
            cursor: None,
        }
    }

    /// Set the filter component.
    #[must_use]
    pub fn with_ql(mut self, ql: impl Into<String>) -> Self {
        self.ql = Some(ql.into());
        self
    }

    /// Set the page-size component.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the cursor component.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    fn for_query(endpoint: &str, query: &Query) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ql: query.ql.clone(),
            limit: query.limit,
            cursor: query.cursor.clone(),
        }
    }
}

/// Offline replacement for [`GridlineClient`](crate::GridlineClient) reads.
///
/// Page traversal goes through the same [`EntityApi`] provided methods as
/// the live client, so ordering and termination behave identically.
#[derive(Debug, Default)]
pub struct ReplayClient {
    pages: HashMap<PageKey, EntityPage>,
    posted: HashMap<String, Vec<Entity>>,
}

impl ReplayClient {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table injected wholesale.
    #[must_use]
    pub fn with_pages(pages: HashMap<PageKey, EntityPage>) -> Self {
        Self {
            pages,
            posted: HashMap::new(),
        }
    }

    /// Record one page for a given fetch.
    pub fn insert_page(&mut self, key: PageKey, page: EntityPage) {
        self.pages.insert(key, page);
    }

    /// Record a created entity and hand it back, as the live client would.
    pub fn post_entity(&mut self, endpoint: &str, data: &Value) -> GridlineResult<Entity> {
        let entity = data.as_object().cloned().ok_or_else(|| {
            GridlineError::GeneralFailure("entity payload must be an object".to_string())
        })?;
        self.posted
            .entry(endpoint.to_string())
            .or_default()
            .push(entity.clone());
        Ok(entity)
    }

    /// Entities recorded against an endpoint by [`ReplayClient::post_entity`].
    #[must_use]
    pub fn posted(&self, endpoint: &str) -> &[Entity] {
        self.posted.get(endpoint).map_or(&[], Vec::as_slice)
    }
}

impl EntityApi for ReplayClient {
    async fn get_entities(&mut self, endpoint: &str, query: &Query) -> GridlineResult<EntityPage> {
        let key = PageKey::for_query(endpoint, query);
        self.pages.get(&key).cloned().ok_or_else(|| {
            GridlineError::GeneralFailure(format!(
                "no recorded page for {endpoint} (ql={:?}, limit={:?}, cursor={:?})",
                key.ql, key.limit, key.cursor
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MAX_PAGE_SIZE;
    use serde_json::json;

    fn entity(uuid: &str) -> Entity {
        json!({"uuid": uuid}).as_object().cloned().unwrap()
    }

    fn page(uuids: &[&str], cursor: Option<&str>) -> EntityPage {
        EntityPage {
            entities: uuids.iter().map(|uuid| entity(uuid)).collect(),
            cursor: cursor.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn replays_a_recorded_page() {
        let mut pages = HashMap::new();
        pages.insert(
            PageKey::new("users").with_limit(10),
            page(&["a", "b"], None),
        );
        pages.insert(
            PageKey::new("users").with_ql("select * where active = true").with_limit(10),
            page(&["a"], None),
        );
        let mut replay = ReplayClient::with_pages(pages);

        let fetched = replay
            .get_entities("users", &Query::new().with_limit(10))
            .await
            .unwrap();
        assert_eq!(fetched.entities.len(), 2);

        let filtered = replay
            .get_entities(
                "users",
                &Query::new()
                    .with_ql("select * where active = true")
                    .with_limit(10),
            )
            .await
            .unwrap();
        assert_eq!(filtered.entities.len(), 1);

        let miss = replay.get_entities("users", &Query::new()).await;
        assert!(miss.is_err());
    }

    #[tokio::test]
    async fn traverses_a_recorded_cursor_chain() {
        let mut replay = ReplayClient::new();
        replay.insert_page(
            PageKey::new("users").with_limit(MAX_PAGE_SIZE),
            page(&["a", "b"], Some("cursor-1")),
        );
        replay.insert_page(
            PageKey::new("users")
                .with_limit(MAX_PAGE_SIZE)
                .with_cursor("cursor-1"),
            page(&["c"], None),
        );

        let all = replay.collect_entities("users", None, None).await.unwrap();
        let uuids: Vec<_> = all.iter().map(|e| e["uuid"].clone()).collect();
        assert_eq!(uuids, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn tables_are_per_instance() {
        let mut first = ReplayClient::new();
        first.insert_page(PageKey::new("users").with_limit(1), page(&["a"], None));

        let mut second = ReplayClient::new();
        let miss = second
            .get_entities("users", &Query::new().with_limit(1))
            .await;
        assert!(miss.is_err());

        let hit = first
            .get_entities("users", &Query::new().with_limit(1))
            .await;
        assert!(hit.is_ok());
    }

    #[tokio::test]
    async fn records_posted_entities() {
        let mut replay = ReplayClient::new();
        let stored = replay
            .post_entity("users", &json!({"uuid": "a", "name": "demo"}))
            .unwrap();
        assert_eq!(stored["name"], "demo");
        assert_eq!(replay.posted("users").len(), 1);
        assert!(replay.posted("stories").is_empty());
    }
}
