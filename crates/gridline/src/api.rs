//! Read and traversal operations shared by the live client and the replay
//! stand-in.

use crate::entity::{Entity, EntityPage, Query};
use crate::error::GridlineResult;

/// Hard cap on the page size requested from the service.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Paged read access to named collections.
///
/// `get_entities` is the only required method; the traversal helpers are
/// provided on top of it so the live client and the replay stand-in share
/// one ordering and one termination rule.
#[allow(async_fn_in_trait)]
pub trait EntityApi {
    /// Fetch a single page.
    ///
    /// A missing resource yields an empty page rather than an error; this is
    /// the one read with built-in not-found tolerance.
    async fn get_entities(&mut self, endpoint: &str, query: &Query) -> GridlineResult<EntityPage>;

    /// First entity matching the query, if any.
    async fn get_entity(
        &mut self,
        endpoint: &str,
        ql: Option<&str>,
    ) -> GridlineResult<Option<Entity>> {
        let mut query = Query::new().with_limit(1);
        if let Some(ql) = ql {
            query = query.with_ql(ql);
        }
        let page = self.get_entities(endpoint, &query).await?;
        Ok(page.entities.into_iter().next())
    }

    /// Every entity of a collection, all pages concatenated in page order
    /// then in-page order.
    ///
    /// Each call starts a fresh traversal; pages are fetched one at a time.
    async fn collect_entities(
        &mut self,
        endpoint: &str,
        ql: Option<&str>,
        limit: Option<u64>,
    ) -> GridlineResult<Vec<Entity>>
    where
        Self: Sized,
    {
        let mut collected = Vec::new();
        self.process_entities(endpoint, |entity| collected.push(entity.clone()), ql, limit)
            .await?;
        Ok(collected)
    }

    /// Apply `apply` to every entity of a collection.
    ///
    /// Each page is fully delivered before the next fetch goes out.
    /// Traversal stops when a page carries no cursor. With a caller-supplied
    /// limit it also stops on a short page, which guards against a stale
    /// cursor on a final partial page.
    async fn process_entities<F>(
        &mut self,
        endpoint: &str,
        mut apply: F,
        ql: Option<&str>,
        limit: Option<u64>,
    ) -> GridlineResult<()>
    where
        F: FnMut(&Entity),
        Self: Sized,
    {
        let page_size = limit.map_or(MAX_PAGE_SIZE, |limit| limit.min(MAX_PAGE_SIZE));
        let mut cursor: Option<String> = None;

        loop {
            let mut query = Query::new().with_limit(page_size);
            if let Some(ql) = ql {
                query = query.with_ql(ql);
            }
            if let Some(cursor) = &cursor {
                query = query.with_cursor(cursor.clone());
            }

            let page = self.get_entities(endpoint, &query).await?;
            let count = page.entities.len() as u64;
            for entity in &page.entities {
                apply(entity);
            }

            match page.cursor {
                None => break,
                Some(next) => {
                    if limit.is_some() && count < page_size {
                        break;
                    }
                    cursor = Some(next);
                }
            }
        }

        Ok(())
    }
}
