//! The projection engine: initial generation and mode-driven updates.
//!
//! The engine is stateless apart from its synthesizer and concurrency
//! bound. Both entry points take the pool and items by reference and
//! return a new [`DocumentProjection`]; callers decide whether to persist
//! it. An update works on a clone, so a dropped update future leaves the
//! caller's projection as it was.
//!
//! # Update pass
//!
//! 1. Fold content added since the projection snapshot into the narrative
//!    context (one theme extraction call).
//! 2. Select candidates through the mode's [`UpdateStrategy`] and plan
//!    each one.
//! 3. Run all synthesis jobs on a [`JoinSet`], at most
//!    `max_concurrent` at a time.
//! 4. Once every job has finished, apply the results in section order and
//!    mark the projection updated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use memoir_projections_core::models::{extract_texts, ContentItem};
use memoir_projections_core::pool::ContentPool;
use memoir_projections_core::projection::{
    DocumentProjection, ProjectionConfig, ProjectionStyle, ProjectionTrigger, UpdateMode,
    UpdateOptions,
};
use memoir_projections_core::section::{ProjectedSection, SectionUpdate, VersionTrigger};
use memoir_projections_core::synthesis::{
    default_section_titles, extract_or_fallback, GenerateRequest, Synthesizer,
};
use memoir_projections_core::{ProjectionError, ProjectionResult};

use crate::strategy::{
    contributors_of, ids_of, select_candidates, strategy_for, Candidate, JobWork, SectionPlan,
    SynthesisJob,
};

pub const DEFAULT_VOICE: &str = "warm and engaging";
pub const CHRONOLOGICAL_TITLE: &str = "The Story";
const CHRONOLOGICAL_TOPIC: &str = "chronological narrative";
const ATTRIBUTION_GUIDANCE: &str = "Attribute each memory to the person who shared it.";

/// Outcome of one update pass.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub projection_id: String,
    pub mode: UpdateMode,
    /// Sections whose content was re-synthesized, in document order.
    pub updated_section_ids: Vec<String>,
    /// Candidates that had nothing new to absorb.
    pub acknowledged_count: usize,
    pub new_content_count: usize,
    pub version: u32,
}

pub struct ProjectionEngine {
    synth: Arc<dyn Synthesizer>,
    max_concurrent: usize,
}

impl ProjectionEngine {
    pub fn new(synth: Arc<dyn Synthesizer>, max_concurrent: usize) -> Self {
        Self {
            synth,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn synthesizer_name(&self) -> &str {
        self.synth.name()
    }

    /// Build a projection from scratch.
    pub async fn generate(
        &self,
        project_id: &str,
        name: &str,
        config: ProjectionConfig,
        pool: &ContentPool,
        items: &[ContentItem],
    ) -> ProjectionResult<DocumentProjection> {
        config.validate()?;
        let current_ids = relevant_ids(&config, pool);
        let index = index_items(items);
        let relevant = lookup(&index, &current_ids);
        let texts = extract_texts(relevant.iter().copied());

        let mut proj = DocumentProjection::new(project_id, name, config);
        let extraction = extract_or_fallback(self.synth.as_ref(), &texts, &[]).await;
        proj.context.absorb(extraction, &current_ids);
        let narrative = proj.context.render_compact();

        let blueprints = blueprints(&proj, &relevant, &texts);
        debug!(
            projection = %proj.id,
            style = %proj.config.style,
            sections = blueprints.len(),
            "planned initial sections"
        );

        let jobs: Vec<(SynthesisJob, Option<String>)> = blueprints
            .into_iter()
            .map(|bp| {
                // Sections get their ids when created from the results.
                let job = SynthesisJob {
                    section_id: String::new(),
                    title: bp.title,
                    work: JobWork::Generate(GenerateRequest {
                        topic: bp.topic,
                        texts: extract_texts(bp.items.iter().copied()),
                        style_guidance: style_guidance(&proj.config, contributors_of(&bp.items).len()),
                        narrative_context: narrative.clone(),
                        target_length: proj.config.length,
                    }),
                    source_content_ids: ids_of(&bp.items),
                    contributor_ids: contributors_of(&bp.items),
                    trigger: VersionTrigger::Generation,
                };
                (job, bp.primary_contributor)
            })
            .collect();

        let (jobs, primaries): (Vec<SynthesisJob>, Vec<Option<String>>) = jobs.into_iter().unzip();
        let titles: Vec<String> = jobs.iter().map(|j| j.title.clone()).collect();
        let updates = self.run_jobs(jobs, &current_ids).await?;

        for ((title, primary), update) in titles.into_iter().zip(primaries).zip(updates) {
            let has_content = !update.content.trim().is_empty();
            let mut section = ProjectedSection::generated(title.clone(), update);
            if let Some(contributor) = primary {
                section = section.with_primary_contributor(contributor);
            }
            proj.add_section(section);
            if has_content {
                proj.context.mark_covered(&title);
            }
        }

        let summary = format!(
            "Initial generation: {} sections from {} content items",
            proj.sections().len(),
            current_ids.len()
        );
        proj.mark_updated(current_ids, ProjectionTrigger::Generation, None, summary);

        info!(
            projection = %proj.id,
            sections = proj.sections().len(),
            words = proj.word_count(),
            synthesizer = self.synth.name(),
            "generated projection"
        );
        Ok(proj)
    }

    /// Apply `mode` to a copy of `projection`.
    ///
    /// `scope` restricts the pass to the listed sections; an unknown id is
    /// an error and nothing is changed.
    pub async fn update(
        &self,
        projection: &DocumentProjection,
        pool: &ContentPool,
        items: &[ContentItem],
        mode: UpdateMode,
        scope: Option<&[String]>,
    ) -> ProjectionResult<(DocumentProjection, UpdateReport)> {
        if let Some(ids) = scope {
            if let Some(missing) = ids.iter().find(|id| projection.section(id).is_none()) {
                return Err(ProjectionError::section_not_found(missing.clone()));
            }
        }

        let current_ids = relevant_ids(&projection.config, pool);
        let index = index_items(items);
        let mut proj = projection.clone();

        let new_ids = pool_delta(&current_ids, proj.content_snapshot_ids());
        let new_texts = extract_texts(lookup(&index, &new_ids));
        if !new_texts.is_empty() {
            let known = proj.context.theme_names();
            let extraction = extract_or_fallback(self.synth.as_ref(), &new_texts, &known).await;
            proj.context.absorb(extraction, &new_ids);
        }

        let strategy = strategy_for(mode);
        let narrative = proj.context.render_compact();
        let mut acknowledged: Vec<String> = Vec::new();
        let mut jobs: Vec<SynthesisJob> = Vec::new();
        {
            let current = lookup(&index, &current_ids);
            let candidates = select_candidates(strategy, &proj, &current_ids, scope);
            debug!(
                projection = %proj.id,
                mode = %mode,
                candidates = candidates.len(),
                "selected update candidates"
            );
            for section in candidates {
                let relevant = section_items(section, &current);
                let candidate = Candidate {
                    section,
                    topic: section_topic(proj.config.style, section),
                    style_guidance: style_guidance(&proj.config, contributors_of(&relevant).len()),
                    relevant,
                    narrative_context: narrative.clone(),
                    length: proj.config.length,
                };
                match strategy.plan(&candidate) {
                    SectionPlan::Acknowledge => acknowledged.push(section.id.clone()),
                    SectionPlan::Synthesize(job) => jobs.push(job),
                }
            }
        }

        let targets: Vec<(String, String)> = jobs
            .iter()
            .map(|j| (j.section_id.clone(), j.title.clone()))
            .collect();
        let updates = self.run_jobs(jobs, &current_ids).await?;

        // Every job has finished; commit in section order.
        for section_id in &acknowledged {
            let snapshot = current_ids.clone();
            proj.with_section_mut(section_id, |s| s.acknowledge_snapshot(snapshot))?;
        }
        let mut updated_section_ids = Vec::with_capacity(targets.len());
        for ((section_id, title), update) in targets.into_iter().zip(updates) {
            proj.apply_section_update(&section_id, update)?;
            proj.context.mark_covered(&title);
            updated_section_ids.push(section_id);
        }

        let summary = format!(
            "{}: updated {} sections with {} new content items",
            mode,
            updated_section_ids.len(),
            new_ids.len()
        );
        proj.mark_updated(current_ids, ProjectionTrigger::Update, Some(mode), summary);

        info!(
            projection = %proj.id,
            mode = %mode,
            updated = updated_section_ids.len(),
            new_content = new_ids.len(),
            version = proj.version(),
            "updated projection"
        );

        let report = UpdateReport {
            projection_id: proj.id.clone(),
            mode,
            updated_section_ids,
            acknowledged_count: acknowledged.len(),
            new_content_count: new_ids.len(),
            version: proj.version(),
        };
        Ok((proj, report))
    }

    /// Preview what an update of `projection` against `pool` would touch.
    pub fn update_options(&self, projection: &DocumentProjection, pool: &ContentPool) -> UpdateOptions {
        projection.update_options(&relevant_ids(&projection.config, pool))
    }

    /// Run jobs concurrently, returning their updates in input order.
    async fn run_jobs(&self, jobs: Vec<SynthesisJob>, snapshot: &[String]) -> ProjectionResult<Vec<SectionUpdate>> {
        let tasks = jobs.into_iter().map(|job| {
            let synth = self.synth.clone();
            let snapshot = snapshot.to_vec();
            job.run(synth, snapshot)
        });
        run_bounded(tasks, self.max_concurrent).await
    }
}

/// Spawn `tasks` on a [`JoinSet`] with at most `limit` running at once.
///
/// Results are returned in input order once all tasks have completed.
async fn run_bounded<I, F, T>(tasks: I, limit: usize) -> ProjectionResult<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let mut count = 0;
    for (idx, task) in tasks.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (idx, task.await)
        });
        count += 1;
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (idx, value) =
            joined.map_err(|e| ProjectionError::Synthesis(format!("synthesis task failed: {}", e)))?;
        results[idx] = Some(value);
    }
    Ok(results.into_iter().flatten().collect())
}

/// Pool ids that pass the projection's contributor and tag filters.
pub fn relevant_ids(config: &ProjectionConfig, pool: &ContentPool) -> Vec<String> {
    pool.filtered(config.contributor_filter.as_deref(), config.tag_filter.as_deref())
}

/// Style instructions for one synthesis call.
///
/// The merge strategy is mentioned only when the input spans more than
/// one contributor.
pub fn style_guidance(config: &ProjectionConfig, contributor_count: usize) -> String {
    let mut parts = vec![config
        .voice_guidance
        .clone()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VOICE.to_string())];
    if contributor_count > 1 {
        parts.push(config.merge_strategy.guidance().to_string());
    }
    if config.show_attributions {
        parts.push(ATTRIBUTION_GUIDANCE.to_string());
    }
    parts.join(" ")
}

struct Blueprint<'a> {
    title: String,
    topic: String,
    items: Vec<&'a ContentItem>,
    primary_contributor: Option<String>,
}

fn blueprints<'a>(proj: &DocumentProjection, relevant: &[&'a ContentItem], texts: &[String]) -> Vec<Blueprint<'a>> {
    let config = &proj.config;
    match config.style {
        ProjectionStyle::Chronological => {
            if relevant.is_empty() {
                return Vec::new();
            }
            vec![Blueprint {
                title: CHRONOLOGICAL_TITLE.to_string(),
                topic: CHRONOLOGICAL_TOPIC.to_string(),
                items: relevant.to_vec(),
                primary_contributor: None,
            }]
        }
        ProjectionStyle::Thematic => {
            let candidates = match &config.suggested_sections {
                Some(titles) if !titles.is_empty() => titles.clone(),
                _ if !proj.context.themes.is_empty() => proj.context.theme_names(),
                _ => default_section_titles(!relevant.is_empty(), texts),
            };
            let mut titles: Vec<String> = Vec::new();
            for raw in candidates {
                let title = title_case(&raw);
                if title.is_empty() || titles.iter().any(|t| t.eq_ignore_ascii_case(&title)) {
                    continue;
                }
                titles.push(title);
            }
            titles
                .into_iter()
                .take(config.max_sections)
                .map(|title| Blueprint {
                    topic: title.clone(),
                    title,
                    items: relevant.to_vec(),
                    primary_contributor: None,
                })
                .collect()
        }
        ProjectionStyle::ByContributor => contributors_of(relevant)
            .into_iter()
            .take(config.max_sections)
            .map(|contributor| Blueprint {
                title: format!("From Contributor {}", short_id(&contributor)),
                topic: format!("contributions from {}", contributor),
                items: relevant
                    .iter()
                    .copied()
                    .filter(|i| i.contributor_id == contributor)
                    .collect(),
                primary_contributor: Some(contributor),
            })
            .collect(),
    }
}

fn section_topic(style: ProjectionStyle, section: &ProjectedSection) -> String {
    if let Some(contributor) = section.primary_contributor_id() {
        return format!("contributions from {}", contributor);
    }
    if style == ProjectionStyle::Chronological && section.title == CHRONOLOGICAL_TITLE {
        return CHRONOLOGICAL_TOPIC.to_string();
    }
    section.title.clone()
}

/// The subset of `current` a section draws from.
fn section_items<'a>(section: &ProjectedSection, current: &[&'a ContentItem]) -> Vec<&'a ContentItem> {
    match section.primary_contributor_id() {
        Some(contributor) => current
            .iter()
            .copied()
            .filter(|i| i.contributor_id == contributor)
            .collect(),
        None => current.to_vec(),
    }
}

fn index_items(items: &[ContentItem]) -> HashMap<&str, &ContentItem> {
    items.iter().map(|i| (i.id.as_str(), i)).collect()
}

fn lookup<'a>(index: &HashMap<&str, &'a ContentItem>, ids: &[String]) -> Vec<&'a ContentItem> {
    ids.iter().filter_map(|id| index.get(id.as_str()).copied()).collect()
}

fn pool_delta(current_ids: &[String], snapshot: &[String]) -> Vec<String> {
    current_ids
        .iter()
        .filter(|id| !snapshot.contains(id))
        .cloned()
        .collect()
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoir_projections_core::projection::MergeStrategy;

    #[test]
    fn test_style_guidance_mentions_merge_only_for_many_voices() {
        let mut config = ProjectionConfig::default();
        assert_eq!(style_guidance(&config, 1), DEFAULT_VOICE);

        config.merge_strategy = MergeStrategy::SeparateVoices;
        config.show_attributions = true;
        config.voice_guidance = Some("plain".into());
        let guidance = style_guidance(&config, 2);
        assert!(guidance.starts_with("plain "));
        assert!(guidance.contains(MergeStrategy::SeparateVoices.guidance()));
        assert!(guidance.ends_with(ATTRIBUTION_GUIDANCE));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("early  years on the farm"), "Early Years On The Farm");
        assert_eq!(title_case("Family"), "Family");
        assert_eq!(title_case("   "), "");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abcdefghijkl"), "abcdefgh");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_pool_delta_keeps_pool_order() {
        let current: Vec<String> = ["c1", "c2", "c3"].iter().map(|s| s.to_string()).collect();
        let snapshot = vec!["c2".to_string()];
        assert_eq!(pool_delta(&current, &snapshot), vec!["c1", "c3"]);
    }

    #[tokio::test]
    async fn test_run_bounded_preserves_order() {
        let tasks = (0..10u64).map(|i| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10 - i)).await;
            i
        });
        let out = run_bounded(tasks, 3).await.unwrap();
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }
}
