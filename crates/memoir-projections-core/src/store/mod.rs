//! Storage abstraction for content pools and projections.
//!
//! The [`ContentStore`] trait covers what the engine needs from the content
//! side (pool membership and item lookup); the [`ProjectionStore`] trait
//! covers saving and loading projections. Both replace process-wide
//! registries: callers inject whichever backend they own.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ContentItem;
use crate::pool::ContentPool;
use crate::projection::DocumentProjection;

/// Content-side storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_item`](ContentStore::add_item) | Store an item and register it in its project's pool |
/// | [`pool`](ContentStore::pool) | Snapshot of a project's pool (empty if unknown) |
/// | [`items`](ContentStore::items) | Fetch items by id, skipping unknown ids |
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store an item and add it to its project's pool.
    ///
    /// Returns `false` if an item with the same id was already present.
    async fn add_item(&self, item: ContentItem) -> Result<bool>;

    /// Snapshot of the pool for `project_id`.
    async fn pool(&self, project_id: &str) -> Result<ContentPool>;

    /// Items for `ids`, in the order given. Unknown ids are skipped.
    async fn items(&self, ids: &[String]) -> Result<Vec<ContentItem>>;
}

/// Projection storage.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Insert or replace a projection by id.
    async fn save_projection(&self, projection: &DocumentProjection) -> Result<()>;

    async fn get_projection(&self, id: &str) -> Result<Option<DocumentProjection>>;

    /// All projections of a project, in creation order.
    async fn list_projections(&self, project_id: &str) -> Result<Vec<DocumentProjection>>;
}
