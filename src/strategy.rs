//! Update strategies: one per [`UpdateMode`].
//!
//! Every mode runs the same skeleton: [`select_candidates`] drops sections
//! that cannot be regenerated, then asks the strategy which of the rest it
//! wants; the engine then asks the strategy to [`plan`](UpdateStrategy::plan)
//! each candidate. Strategies never see locked or draft sections.
//!
//! | Mode | Candidates | Per candidate |
//! |------|------------|---------------|
//! | regenerate | all regeneratable | full synthesis from all relevant content |
//! | evolve | stale | integrate the unseen content into existing prose |
//! | refresh | stale | full synthesis from all relevant content |
//! | append | stale | synthesize the unseen content, append after a separator |
//!
//! A [`SynthesisJob`] owns everything it needs, so jobs can run on spawned
//! tasks without borrowing the projection.

use std::collections::HashSet;
use std::sync::Arc;

use memoir_projections_core::models::{extract_texts, ContentItem};
use memoir_projections_core::projection::{DocumentProjection, ProjectionLength, UpdateMode};
use memoir_projections_core::section::{ProjectedSection, SectionUpdate, VersionTrigger};
use memoir_projections_core::synthesis::{
    generate_or_fallback, integrate_or_fallback, GenerateRequest, IntegrateRequest, Synthesizer,
};

/// Separator placed between existing prose and appended prose.
pub const APPEND_SEPARATOR: &str = "\n\n---\n\n";

/// Everything a strategy may look at when planning one section.
pub struct Candidate<'a> {
    pub section: &'a ProjectedSection,
    pub topic: String,
    /// Items relevant to this section, in pool order.
    pub relevant: Vec<&'a ContentItem>,
    pub style_guidance: String,
    pub narrative_context: String,
    pub length: ProjectionLength,
}

impl<'a> Candidate<'a> {
    /// Relevant items the section has not seen yet.
    pub fn unseen(&self) -> Vec<&'a ContentItem> {
        let seen: HashSet<&str> = self
            .section
            .last_content_snapshot()
            .iter()
            .map(String::as_str)
            .collect();
        self.relevant
            .iter()
            .copied()
            .filter(|item| !seen.contains(item.id.as_str()))
            .collect()
    }

    fn generate_request(&self, topic: String, items: &[&ContentItem]) -> GenerateRequest {
        GenerateRequest {
            topic,
            texts: extract_texts(items.iter().copied()),
            style_guidance: self.style_guidance.clone(),
            narrative_context: self.narrative_context.clone(),
            target_length: self.length,
        }
    }

    /// A job that re-synthesizes the section from all relevant content.
    fn full_synthesis(&self, trigger: VersionTrigger) -> SynthesisJob {
        SynthesisJob {
            section_id: self.section.id.clone(),
            title: self.section.title.clone(),
            work: JobWork::Generate(self.generate_request(self.topic.clone(), &self.relevant)),
            source_content_ids: ids_of(&self.relevant),
            contributor_ids: contributors_of(&self.relevant),
            trigger,
        }
    }

    /// Existing sources and contributors extended by `added`.
    fn extended_provenance(&self, added: &[&ContentItem]) -> (Vec<String>, Vec<String>) {
        let mut sources = self.section.source_content_ids().to_vec();
        let mut contributors = self.section.contributor_ids().to_vec();
        for item in added {
            if !sources.contains(&item.id) {
                sources.push(item.id.clone());
            }
            if !contributors.contains(&item.contributor_id) {
                contributors.push(item.contributor_id.clone());
            }
        }
        (sources, contributors)
    }
}

/// What to do with one candidate section.
pub enum SectionPlan {
    /// Nothing new has text for this section: adopt the snapshot only.
    Acknowledge,
    Synthesize(SynthesisJob),
}

pub enum JobWork {
    Generate(GenerateRequest),
    Integrate {
        request: IntegrateRequest,
        summary: String,
    },
    Append {
        request: GenerateRequest,
        existing: String,
        summary: String,
    },
}

/// One section's worth of synthesis, detached from the projection.
pub struct SynthesisJob {
    pub section_id: String,
    pub title: String,
    pub work: JobWork,
    pub source_content_ids: Vec<String>,
    pub contributor_ids: Vec<String>,
    pub trigger: VersionTrigger,
}

impl SynthesisJob {
    /// Run the synthesis (with fallbacks) and build the section update.
    pub async fn run(self, synth: Arc<dyn Synthesizer>, snapshot_ids: Vec<String>) -> SectionUpdate {
        let (content, summary) = match self.work {
            JobWork::Generate(request) => {
                let generated = generate_or_fallback(synth.as_ref(), &request).await;
                (generated.content, generated.summary)
            }
            JobWork::Integrate { request, summary } => {
                (integrate_or_fallback(synth.as_ref(), &request).await, summary)
            }
            JobWork::Append {
                request,
                existing,
                summary,
            } => {
                let addition = generate_or_fallback(synth.as_ref(), &request).await;
                let content = if existing.trim().is_empty() {
                    addition.content
                } else if addition.content.trim().is_empty() {
                    existing
                } else {
                    format!("{}{}{}", existing, APPEND_SEPARATOR, addition.content)
                };
                (content, summary)
            }
        };
        SectionUpdate {
            content,
            summary,
            source_content_ids: self.source_content_ids,
            contributor_ids: self.contributor_ids,
            snapshot_ids,
            trigger: self.trigger,
        }
    }
}

/// Mode-specific behavior plugged into the shared update skeleton.
pub trait UpdateStrategy: Send + Sync {
    fn mode(&self) -> UpdateMode;

    /// Whether a regeneratable section is a candidate.
    fn wants(&self, section: &ProjectedSection, current_ids: &[String]) -> bool;

    fn plan(&self, candidate: &Candidate<'_>) -> SectionPlan;
}

pub struct Regenerate;
pub struct Evolve;
pub struct Refresh;
pub struct Append;

impl UpdateStrategy for Regenerate {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Regenerate
    }

    fn wants(&self, _section: &ProjectedSection, _current_ids: &[String]) -> bool {
        true
    }

    fn plan(&self, candidate: &Candidate<'_>) -> SectionPlan {
        SectionPlan::Synthesize(candidate.full_synthesis(VersionTrigger::Regeneration))
    }
}

impl UpdateStrategy for Refresh {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Refresh
    }

    fn wants(&self, section: &ProjectedSection, current_ids: &[String]) -> bool {
        section.is_stale(current_ids)
    }

    fn plan(&self, candidate: &Candidate<'_>) -> SectionPlan {
        SectionPlan::Synthesize(candidate.full_synthesis(VersionTrigger::Refresh))
    }
}

impl UpdateStrategy for Evolve {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Evolve
    }

    fn wants(&self, section: &ProjectedSection, current_ids: &[String]) -> bool {
        section.is_stale(current_ids)
    }

    fn plan(&self, candidate: &Candidate<'_>) -> SectionPlan {
        if candidate.section.content().trim().is_empty() {
            if extract_texts(candidate.relevant.iter().copied()).is_empty() {
                return SectionPlan::Acknowledge;
            }
            return SectionPlan::Synthesize(candidate.full_synthesis(VersionTrigger::Evolution));
        }

        let unseen = candidate.unseen();
        let new_texts = extract_texts(unseen.iter().copied());
        if new_texts.is_empty() {
            return SectionPlan::Acknowledge;
        }

        let (sources, contributors) = candidate.extended_provenance(&unseen);
        SectionPlan::Synthesize(SynthesisJob {
            section_id: candidate.section.id.clone(),
            title: candidate.section.title.clone(),
            work: JobWork::Integrate {
                request: IntegrateRequest {
                    topic: candidate.topic.clone(),
                    existing_content: candidate.section.content().to_string(),
                    new_texts,
                    style_guidance: candidate.style_guidance.clone(),
                    target_length: candidate.length,
                },
                summary: candidate.section.summary().to_string(),
            },
            source_content_ids: sources,
            contributor_ids: contributors,
            trigger: VersionTrigger::Evolution,
        })
    }
}

impl UpdateStrategy for Append {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Append
    }

    fn wants(&self, section: &ProjectedSection, current_ids: &[String]) -> bool {
        section.is_stale(current_ids)
    }

    fn plan(&self, candidate: &Candidate<'_>) -> SectionPlan {
        let unseen = candidate.unseen();
        let request = candidate.generate_request(
            format!("additional content for {}", candidate.section.title),
            &unseen,
        );
        if request.texts.is_empty() {
            return SectionPlan::Acknowledge;
        }

        let (sources, contributors) = candidate.extended_provenance(&unseen);
        SectionPlan::Synthesize(SynthesisJob {
            section_id: candidate.section.id.clone(),
            title: candidate.section.title.clone(),
            work: JobWork::Append {
                request,
                existing: candidate.section.content().to_string(),
                summary: candidate.section.summary().to_string(),
            },
            source_content_ids: sources,
            contributor_ids: contributors,
            trigger: VersionTrigger::Append,
        })
    }
}

pub fn strategy_for(mode: UpdateMode) -> &'static dyn UpdateStrategy {
    match mode {
        UpdateMode::Regenerate => &Regenerate,
        UpdateMode::Evolve => &Evolve,
        UpdateMode::Refresh => &Refresh,
        UpdateMode::Append => &Append,
    }
}

/// The shared candidate skeleton.
///
/// Only EMPTY or GENERATED sections reach the strategy. `scope`, when
/// given, further narrows the result to the listed section ids.
pub fn select_candidates<'a>(
    strategy: &dyn UpdateStrategy,
    projection: &'a DocumentProjection,
    current_ids: &[String],
    scope: Option<&[String]>,
) -> Vec<&'a ProjectedSection> {
    projection
        .sections()
        .iter()
        .filter(|s| s.can_regenerate())
        .filter(|s| strategy.wants(s, current_ids))
        .filter(|s| scope.map(|ids| ids.contains(&s.id)).unwrap_or(true))
        .collect()
}

pub(crate) fn ids_of(items: &[&ContentItem]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

/// Distinct contributors of `items`, in first-seen order.
pub(crate) fn contributors_of(items: &[&ContentItem]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item.contributor_id) {
            out.push(item.contributor_id.clone());
        }
    }
    out
}
