//! Entity archival: snapshot an entity plus its relationship closure into a
//! parallel collection, then delete the original.

use serde_json::Value;

use crate::api::EntityApi;
use crate::client::GridlineClient;
use crate::entity::Entity;
use crate::error::{GridlineError, GridlineResult};

/// Relationship directions walked during archival, in fixed order.
const EDGE_KINDS: [&str; 2] = ["connecting", "connections"];

impl GridlineClient {
    /// Archive one entity.
    ///
    /// The entity is fetched, every relationship edge recorded in its
    /// metadata is fully traversed and the reachable entities attached under
    /// `__{direction}_{edge}` keys, the populated snapshot is posted to
    /// `archived_{entity_type}`, and only then is the original deleted.
    /// Any failure before the post leaves the service untouched. An entity
    /// with no relationship metadata archives cleanly.
    ///
    /// Returns the archived entity in the service's stored form.
    pub async fn archive_entity(
        &mut self,
        entity_type: &str,
        entity_id: &str,
    ) -> GridlineResult<Entity> {
        let mut entity = self
            .get_entity_by_id(entity_type, entity_id)
            .await?
            .ok_or_else(|| {
                GridlineError::GeneralFailure(format!(
                    "no entity at {entity_type}/{entity_id}"
                ))
            })?;

        for kind in EDGE_KINDS {
            for (edge, path) in edges_of(&entity, kind) {
                let reached = self.collect_entities(&path, None, None).await?;
                let reached: Vec<Value> = reached.into_iter().map(Value::Object).collect();
                entity.insert(format!("__{kind}_{edge}"), Value::Array(reached));
            }
        }

        let archived = self
            .post_entity(
                &format!("archived_{entity_type}"),
                &Value::Object(entity.clone()),
            )
            .await?;

        self.delete_entity_by_id(entity_type, entity_id).await?;

        Ok(archived)
    }
}

/// Named edges of one relationship direction. Missing metadata or a missing
/// direction key is an empty set, not an error.
fn edges_of(entity: &Entity, kind: &str) -> Vec<(String, String)> {
    entity
        .get("metadata")
        .and_then(|metadata| metadata.get(kind))
        .and_then(Value::as_object)
        .map(|edges| {
            edges
                .iter()
                .filter_map(|(edge, path)| {
                    path.as_str().map(|path| (edge.clone(), path.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}
