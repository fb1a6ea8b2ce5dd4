//! In-memory store for tests, the CLI, and WASM targets.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Lock poisoning is reported as an error rather than a panic.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ContentItem;
use crate::pool::ContentPool;
use crate::projection::DocumentProjection;

use super::{ContentStore, ProjectionStore};

/// In-memory content and projection store.
pub struct InMemoryStore {
    items: RwLock<HashMap<String, ContentItem>>,
    pools: RwLock<HashMap<String, ContentPool>>,
    projections: RwLock<HashMap<String, DocumentProjection>>,
    /// project id → projection ids in creation order
    project_index: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            projections: RwLock::new(HashMap::new()),
            project_index: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn add_item(&self, item: ContentItem) -> Result<bool> {
        let added = {
            let mut pools = self.pools.write().map_err(poisoned)?;
            pools
                .entry(item.project_id.clone())
                .or_insert_with(|| ContentPool::new(item.project_id.clone()))
                .add(&item.id, &item.contributor_id, &item.tags)
        };
        if added {
            let mut items = self.items.write().map_err(poisoned)?;
            items.insert(item.id.clone(), item);
        }
        Ok(added)
    }

    async fn pool(&self, project_id: &str) -> Result<ContentPool> {
        let pools = self.pools.read().map_err(poisoned)?;
        Ok(pools
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| ContentPool::new(project_id)))
    }

    async fn items(&self, ids: &[String]) -> Result<Vec<ContentItem>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStore {
    async fn save_projection(&self, projection: &DocumentProjection) -> Result<()> {
        let is_new = {
            let mut projections = self.projections.write().map_err(poisoned)?;
            projections
                .insert(projection.id.clone(), projection.clone())
                .is_none()
        };
        if is_new {
            let mut index = self.project_index.write().map_err(poisoned)?;
            index
                .entry(projection.project_id.clone())
                .or_default()
                .push(projection.id.clone());
        }
        Ok(())
    }

    async fn get_projection(&self, id: &str) -> Result<Option<DocumentProjection>> {
        let projections = self.projections.read().map_err(poisoned)?;
        Ok(projections.get(id).cloned())
    }

    async fn list_projections(&self, project_id: &str) -> Result<Vec<DocumentProjection>> {
        let index = self.project_index.read().map_err(poisoned)?;
        let projections = self.projections.read().map_err(poisoned)?;
        Ok(index
            .get(project_id)
            .map(|ids| ids.iter().filter_map(|id| projections.get(id).cloned()).collect())
            .unwrap_or_default())
    }
}
