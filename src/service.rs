//! The projection service: the crate's exposed surface.
//!
//! Wraps the [`ProjectionEngine`] with injected content and projection
//! stores. Every operation that reads and then writes one projection runs
//! under that projection's async mutex, so two updates of the same
//! projection never interleave, while different projections proceed
//! independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

use memoir_projections_core::models::ContentItem;
use memoir_projections_core::pool::ContentPool;
use memoir_projections_core::projection::{
    ContributorInfo, DocumentProjection, ProjectionConfig, UpdateMode, UpdateOptions,
};
use memoir_projections_core::section::SectionVersion;
use memoir_projections_core::store::memory::InMemoryStore;
use memoir_projections_core::store::{ContentStore, ProjectionStore};
use memoir_projections_core::{ProjectionError, ProjectionResult};

use crate::config::Config;
use crate::engine::{ProjectionEngine, UpdateReport};
use crate::synthesis::create_synthesizer;

/// Result of ingesting one content item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentAdded {
    /// False when the item id was already in the pool.
    pub added: bool,
    /// Updates run for projections with `auto_update_on_content`.
    pub auto_updates: Vec<UpdateReport>,
    /// Projections that now have unabsorbed content.
    pub stale_projection_ids: Vec<String>,
}

pub struct ProjectionService {
    content: Arc<dyn ContentStore>,
    projections: Arc<dyn ProjectionStore>,
    engine: ProjectionEngine,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProjectionService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        projections: Arc<dyn ProjectionStore>,
        engine: ProjectionEngine,
    ) -> Self {
        Self {
            content,
            projections,
            engine,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// A service over a fresh in-memory store, with the synthesizer and
    /// concurrency bound taken from `config`.
    pub fn in_memory(config: &Config) -> anyhow::Result<Self> {
        let synth = create_synthesizer(&config.synthesis)?;
        let store = Arc::new(InMemoryStore::new());
        Ok(Self::new(
            store.clone(),
            store,
            ProjectionEngine::new(synth, config.engine.max_concurrent_synthesis),
        ))
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    /// Take the projection's lock. Entries nobody holds or waits on are
    /// dropped from the map on the way.
    async fn guard(&self, projection_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|id, lock| id == projection_id || Arc::strong_count(lock) > 1);
            locks
                .entry(projection_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn pool_and_items(&self, project_id: &str) -> ProjectionResult<(ContentPool, Vec<ContentItem>)> {
        let pool = self.content.pool(project_id).await?;
        let items = self.content.items(pool.content_ids()).await?;
        Ok((pool, items))
    }

    async fn load(&self, projection_id: &str) -> ProjectionResult<DocumentProjection> {
        self.projections
            .get_projection(projection_id)
            .await?
            .ok_or_else(|| ProjectionError::projection_not_found(projection_id))
    }

    /// Load, mutate, and save one projection under its lock.
    async fn modify<F, R>(&self, projection_id: &str, f: F) -> ProjectionResult<R>
    where
        F: FnOnce(&mut DocumentProjection) -> ProjectionResult<R>,
    {
        let _guard = self.guard(projection_id).await;
        let mut proj = self.load(projection_id).await?;
        let out = f(&mut proj)?;
        self.projections.save_projection(&proj).await?;
        Ok(out)
    }

    // ── content ────────────────────────────────────────────────────────

    /// Ingest a content item and react per projection.
    ///
    /// Projections of the item's project with `auto_update_on_content` are
    /// updated with their default mode; the rest are reported stale when
    /// they have content they have not absorbed.
    pub async fn add_content(&self, item: ContentItem) -> ProjectionResult<ContentAdded> {
        let project_id = item.project_id.clone();
        if !self.content.add_item(item).await? {
            return Ok(ContentAdded::default());
        }

        let mut out = ContentAdded {
            added: true,
            ..Default::default()
        };
        let pool = self.content.pool(&project_id).await?;
        for proj in self.projections.list_projections(&project_id).await? {
            if proj.config.auto_update_on_content {
                let (_, report) = self.update(&proj.id, None, None).await?;
                out.auto_updates.push(report);
            } else if self.engine.update_options(&proj, &pool).has_new_content {
                out.stale_projection_ids.push(proj.id.clone());
            }
        }
        Ok(out)
    }

    // ── projections ────────────────────────────────────────────────────

    /// Generate and store a new projection over the project's pool.
    pub async fn create_projection(
        &self,
        project_id: &str,
        name: &str,
        config: ProjectionConfig,
    ) -> ProjectionResult<DocumentProjection> {
        let (pool, items) = self.pool_and_items(project_id).await?;
        let proj = self
            .engine
            .generate(project_id, name, config, &pool, &items)
            .await?;
        let _guard = self.guard(&proj.id).await;
        self.projections.save_projection(&proj).await?;
        info!(projection = %proj.id, project = project_id, "stored new projection");
        Ok(proj)
    }

    /// Store an existing projection as-is (e.g. one loaded from an export).
    pub async fn import_projection(&self, projection: &DocumentProjection) -> ProjectionResult<()> {
        let _guard = self.guard(&projection.id).await;
        self.projections.save_projection(projection).await?;
        Ok(())
    }

    pub async fn get_projection(&self, projection_id: &str) -> ProjectionResult<DocumentProjection> {
        self.load(projection_id).await
    }

    pub async fn list_projections(&self, project_id: &str) -> ProjectionResult<Vec<DocumentProjection>> {
        Ok(self.projections.list_projections(project_id).await?)
    }

    pub async fn render(&self, projection_id: &str) -> ProjectionResult<String> {
        Ok(self.load(projection_id).await?.full_text())
    }

    pub async fn update_options(&self, projection_id: &str) -> ProjectionResult<UpdateOptions> {
        let proj = self.load(projection_id).await?;
        let pool = self.content.pool(&proj.project_id).await?;
        Ok(self.engine.update_options(&proj, &pool))
    }

    /// Run an update pass and store the result.
    ///
    /// `mode` defaults to the projection's `default_update_mode`; `scope`
    /// restricts the pass to the listed sections.
    pub async fn update(
        &self,
        projection_id: &str,
        mode: Option<UpdateMode>,
        scope: Option<&[String]>,
    ) -> ProjectionResult<(DocumentProjection, UpdateReport)> {
        let _guard = self.guard(projection_id).await;
        let proj = self.load(projection_id).await?;
        let mode = mode.unwrap_or(proj.config.default_update_mode);
        let (pool, items) = self.pool_and_items(&proj.project_id).await?;

        let (updated, report) = self.engine.update(&proj, &pool, &items, mode, scope).await?;
        self.projections.save_projection(&updated).await?;
        Ok((updated, report))
    }

    // ── sections ───────────────────────────────────────────────────────

    pub async fn lock_section(
        &self,
        projection_id: &str,
        section_id: &str,
        user_id: &str,
        reason: &str,
    ) -> ProjectionResult<()> {
        self.modify(projection_id, |p| p.lock_section(section_id, user_id, reason))
            .await
    }

    pub async fn unlock_section(&self, projection_id: &str, section_id: &str) -> ProjectionResult<()> {
        self.modify(projection_id, |p| p.unlock_section(section_id)).await
    }

    pub async fn start_editing(&self, projection_id: &str, section_id: &str) -> ProjectionResult<()> {
        self.modify(projection_id, |p| p.start_editing_section(section_id))
            .await
    }

    pub async fn edit_section(
        &self,
        projection_id: &str,
        section_id: &str,
        content: String,
        lock: bool,
        user_id: Option<&str>,
    ) -> ProjectionResult<()> {
        self.modify(projection_id, |p| p.edit_section(section_id, content, lock, user_id))
            .await
    }

    pub async fn revert_section(&self, projection_id: &str, section_id: &str, version: u32) -> ProjectionResult<()> {
        self.modify(projection_id, |p| p.revert_section(section_id, version))
            .await
    }

    pub async fn reorder_sections(&self, projection_id: &str, ordered_ids: &[String]) -> ProjectionResult<()> {
        self.modify(projection_id, |p| {
            p.reorder_sections(ordered_ids);
            Ok(())
        })
        .await
    }

    pub async fn update_contributors(
        &self,
        projection_id: &str,
        contributors: &BTreeMap<String, ContributorInfo>,
    ) -> ProjectionResult<()> {
        self.modify(projection_id, |p| {
            p.update_contributor_summary(contributors);
            Ok(())
        })
        .await
    }

    /// Past versions of a section, oldest first.
    pub async fn section_history(&self, projection_id: &str, section_id: &str) -> ProjectionResult<Vec<SectionVersion>> {
        let proj = self.load(projection_id).await?;
        let section = proj
            .section(section_id)
            .ok_or_else(|| ProjectionError::section_not_found(section_id))?;
        Ok(section.history().iter().cloned().collect())
    }
}
