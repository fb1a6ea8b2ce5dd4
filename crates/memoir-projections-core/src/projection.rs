//! Document projections: named, regenerable views over a content pool.
//!
//! A [`DocumentProjection`] owns its ordered sections, its narrative
//! context, and a bounded record of its own versions. Every method that
//! changes section content recomputes `word_count` and `updated_at` before
//! returning, so the derived stats never drift from the sections.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::NarrativeContext;
use crate::error::{ProjectionError, ProjectionResult};
use crate::history::{deserialize_bounded, BoundedHistory, PROJECTION_HISTORY_CAPACITY};
use crate::section::{ProjectedSection, SectionUpdate};

// ═══════════════════════════════════════════════════════════════════════
// Configuration enums
// ═══════════════════════════════════════════════════════════════════════

/// Implements `Display`/`FromStr` over the snake_case wire names, with
/// unknown values reported as [`ProjectionError::Configuration`].
macro_rules! config_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProjectionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => {
                        let valid: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        Err(ProjectionError::Configuration(format!(
                            "unknown {} '{}'; expected one of: {}",
                            $label,
                            other,
                            valid.join(", ")
                        )))
                    }
                }
            }
        }
    };
}

/// How sections are organized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStyle {
    /// One section spanning all content in pool order.
    Chronological,
    /// One section per suggested or discovered theme.
    #[default]
    Thematic,
    /// One section per contributor.
    ByContributor,
}

config_enum!(ProjectionStyle, "style", {
    Chronological => "chronological",
    Thematic => "thematic",
    ByContributor => "by_contributor",
});

/// Target density of the prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionLength {
    Summary,
    #[default]
    Standard,
    Comprehensive,
}

config_enum!(ProjectionLength, "length", {
    Summary => "summary",
    Standard => "standard",
    Comprehensive => "comprehensive",
});

impl ProjectionLength {
    /// The length hint passed to the synthesis capability.
    pub fn target(&self) -> &'static str {
        match self {
            ProjectionLength::Summary => "brief",
            ProjectionLength::Standard => "standard",
            ProjectionLength::Comprehensive => "detailed",
        }
    }
}

/// How an existing projection absorbs new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Fully re-synthesize every regeneratable section.
    Regenerate,
    /// Weave new content into the existing prose of stale sections.
    #[default]
    Evolve,
    /// Fully re-synthesize stale sections only.
    Refresh,
    /// Append prose for new content after the existing text of stale sections.
    Append,
}

config_enum!(UpdateMode, "update mode", {
    Regenerate => "regenerate",
    Evolve => "evolve",
    Refresh => "refresh",
    Append => "append",
});

impl UpdateMode {
    pub fn description(&self) -> &'static str {
        match self {
            UpdateMode::Regenerate => "Fully regenerate unlocked sections from all content",
            UpdateMode::Evolve => "Integrate new content while preserving existing structure",
            UpdateMode::Refresh => "Only update sections with new relevant content",
            UpdateMode::Append => "Add new content after existing text without rewriting it",
        }
    }
}

/// How prose from several contributors is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Weave,
    SeparateVoices,
    SubjectPrimary,
    EqualVoices,
    Annotated,
}

config_enum!(MergeStrategy, "merge strategy", {
    Weave => "weave",
    SeparateVoices => "separate_voices",
    SubjectPrimary => "subject_primary",
    EqualVoices => "equal_voices",
    Annotated => "annotated",
});

impl MergeStrategy {
    pub fn guidance(&self) -> &'static str {
        match self {
            MergeStrategy::Weave => {
                "Blend all perspectives seamlessly into one unified narrative."
            }
            MergeStrategy::SeparateVoices => {
                "Keep each contributor's voice distinct, introducing who is remembering."
            }
            MergeStrategy::SubjectPrimary => {
                "Treat the subject's own words as primary; use others only to add context."
            }
            MergeStrategy::EqualVoices => "Give every contributor's perspective equal weight.",
            MergeStrategy::Annotated => {
                "Write one main narrative and annotate it with contributors' recollections."
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Projection configuration
// ═══════════════════════════════════════════════════════════════════════

fn default_min_sections() -> usize {
    1
}

fn default_max_sections() -> usize {
    20
}

/// Per-projection generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default)]
    pub style: ProjectionStyle,
    #[serde(default)]
    pub length: ProjectionLength,
    #[serde(default)]
    pub default_update_mode: UpdateMode,
    #[serde(default)]
    pub auto_update_on_content: bool,
    #[serde(default)]
    pub contributor_filter: Option<Vec<String>>,
    #[serde(default)]
    pub tag_filter: Option<Vec<String>>,
    #[serde(default)]
    pub suggested_sections: Option<Vec<String>>,
    #[serde(default = "default_min_sections")]
    pub min_sections: usize,
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
    #[serde(default)]
    pub voice_guidance: Option<String>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub show_attributions: bool,
    #[serde(default)]
    pub subject_contributor_id: Option<String>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            style: ProjectionStyle::default(),
            length: ProjectionLength::default(),
            default_update_mode: UpdateMode::default(),
            auto_update_on_content: false,
            contributor_filter: None,
            tag_filter: None,
            suggested_sections: None,
            min_sections: default_min_sections(),
            max_sections: default_max_sections(),
            voice_guidance: None,
            merge_strategy: MergeStrategy::default(),
            show_attributions: false,
            subject_contributor_id: None,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> ProjectionResult<()> {
        if self.max_sections == 0 {
            return Err(ProjectionError::Configuration(
                "max_sections must be >= 1".into(),
            ));
        }
        if self.min_sections > self.max_sections {
            return Err(ProjectionError::Configuration(format!(
                "min_sections ({}) exceeds max_sections ({})",
                self.min_sections, self.max_sections
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Versions, status, and update options
// ═══════════════════════════════════════════════════════════════════════

/// What caused a projection version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionTrigger {
    Generation,
    Update,
}

/// Record of a projection's state just before a version bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub trigger: ProjectionTrigger,
    pub update_mode: Option<UpdateMode>,
    pub section_count: usize,
    pub word_count: usize,
    pub content_item_count: usize,
    pub change_summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionStatus {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub sections_count: usize,
    pub locked_count: usize,
    pub word_count: usize,
    pub last_updated: DateTime<Utc>,
    pub last_regenerated: Option<DateTime<Utc>>,
    pub content_items_used: usize,
    pub themes_count: usize,
}

/// Expected blast radius of one update mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeOption {
    pub mode: UpdateMode,
    pub description: &'static str,
    pub affects_sections: usize,
}

/// Read-only preview of what an update would touch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOptions {
    pub has_new_content: bool,
    pub new_content_count: usize,
    pub stale_section_count: usize,
    pub stale_section_ids: Vec<String>,
    pub regeneratable_count: usize,
    pub locked_count: usize,
    pub locked_section_ids: Vec<String>,
    pub available_modes: Vec<ModeOption>,
}

impl UpdateOptions {
    pub fn affects(&self, mode: UpdateMode) -> usize {
        self.available_modes
            .iter()
            .find(|m| m.mode == mode)
            .map(|m| m.affects_sections)
            .unwrap_or(0)
    }
}

/// Caller-supplied facts about a contributor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorInfo {
    pub name: Option<String>,
    pub role: Option<String>,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorSummary {
    pub name: String,
    pub role: String,
    pub relationship: Option<String>,
    pub sections_contributed: usize,
    pub is_subject: bool,
}

// ═══════════════════════════════════════════════════════════════════════
// Document projection
// ═══════════════════════════════════════════════════════════════════════

fn projection_history() -> BoundedHistory<ProjectionVersion> {
    BoundedHistory::with_capacity(PROJECTION_HISTORY_CAPACITY)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProjection {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    sections: Vec<ProjectedSection>,
    pub config: ProjectionConfig,
    pub context: NarrativeContext,
    version: u32,
    #[serde(
        default = "projection_history",
        deserialize_with = "deserialize_bounded::<_, _, PROJECTION_HISTORY_CAPACITY>"
    )]
    version_history: BoundedHistory<ProjectionVersion>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    last_regenerated: Option<DateTime<Utc>>,
    #[serde(default)]
    content_snapshot_ids: Vec<String>,
    #[serde(default)]
    contributor_ids: Vec<String>,
    #[serde(default)]
    contributor_summary: BTreeMap<String, ContributorSummary>,
    word_count: usize,
}

impl DocumentProjection {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>, config: ProjectionConfig) -> Self {
        let now = Utc::now();
        Self {
            id: format!("doc_{}", uuid::Uuid::new_v4().simple()),
            project_id: project_id.into(),
            name: name.into(),
            description: String::new(),
            sections: Vec::new(),
            config,
            context: NarrativeContext::default(),
            version: 1,
            version_history: projection_history(),
            created_at: now,
            updated_at: now,
            last_regenerated: None,
            content_snapshot_ids: Vec::new(),
            contributor_ids: Vec::new(),
            contributor_summary: BTreeMap::new(),
            word_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    // ── accessors ──────────────────────────────────────────────────────

    pub fn sections(&self) -> &[ProjectedSection] {
        &self.sections
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn version_history(&self) -> &BoundedHistory<ProjectionVersion> {
        &self.version_history
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn content_snapshot_ids(&self) -> &[String] {
        &self.content_snapshot_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_regenerated(&self) -> Option<DateTime<Utc>> {
        self.last_regenerated
    }

    pub fn contributor_ids(&self) -> &[String] {
        &self.contributor_ids
    }

    pub fn contributor_summary(&self) -> &BTreeMap<String, ContributorSummary> {
        &self.contributor_summary
    }

    // ── section management ─────────────────────────────────────────────

    pub fn section(&self, section_id: &str) -> Option<&ProjectedSection> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn section_by_title(&self, title: &str) -> Option<&ProjectedSection> {
        let wanted = title.to_lowercase();
        self.sections.iter().find(|s| s.title.to_lowercase() == wanted)
    }

    /// Append a section, assigning it the next dense `order`.
    pub fn add_section(&mut self, mut section: ProjectedSection) {
        section.order = self.sections.len();
        self.sections.push(section);
        self.refresh_stats();
    }

    /// Remove a section and renumber the rest densely.
    pub fn remove_section(&mut self, section_id: &str) -> ProjectionResult<ProjectedSection> {
        let idx = self
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or_else(|| ProjectionError::section_not_found(section_id))?;
        let removed = self.sections.remove(idx);
        self.renumber();
        self.refresh_stats();
        Ok(removed)
    }

    /// Reorder sections by id.
    ///
    /// Unknown ids are ignored. Known ids take the leading positions in the
    /// given order; sections not mentioned keep their relative order after
    /// them.
    pub fn reorder_sections(&mut self, ordered_ids: &[String]) {
        let mut remaining: Vec<Option<ProjectedSection>> =
            std::mem::take(&mut self.sections).into_iter().map(Some).collect();
        let index: HashMap<String, usize> = remaining
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (s.id.clone(), i)))
            .collect();

        let mut ordered = Vec::with_capacity(remaining.len());
        for id in ordered_ids {
            if let Some(&i) = index.get(id) {
                if let Some(section) = remaining[i].take() {
                    ordered.push(section);
                }
            }
        }
        ordered.extend(remaining.into_iter().flatten());
        self.sections = ordered;
        self.renumber();
    }

    /// Run `f` against one section, then recompute stats if it succeeded.
    pub fn with_section_mut<F, R>(&mut self, section_id: &str, f: F) -> ProjectionResult<R>
    where
        F: FnOnce(&mut ProjectedSection) -> ProjectionResult<R>,
    {
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| ProjectionError::section_not_found(section_id))?;
        let result = f(section)?;
        self.refresh_stats();
        Ok(result)
    }

    // ── locking and editing ────────────────────────────────────────────

    pub fn lock_section(&mut self, section_id: &str, user_id: &str, reason: &str) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| {
            s.lock(user_id, reason);
            Ok(())
        })
    }

    pub fn unlock_section(&mut self, section_id: &str) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| s.unlock())
    }

    pub fn start_editing_section(&mut self, section_id: &str) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| s.start_editing())
    }

    pub fn edit_section(
        &mut self,
        section_id: &str,
        new_content: String,
        lock: bool,
        user_id: Option<&str>,
    ) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| {
            s.finish_editing(new_content, lock, user_id);
            Ok(())
        })
    }

    pub fn revert_section(&mut self, section_id: &str, version: u32) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| s.revert_to_version(version))
    }

    /// Content-path update of one section; rejected unless regeneratable.
    pub fn apply_section_update(&mut self, section_id: &str, update: SectionUpdate) -> ProjectionResult<()> {
        self.with_section_mut(section_id, |s| s.update_content(update))
    }

    pub fn locked_sections(&self) -> Vec<&ProjectedSection> {
        self.sections.iter().filter(|s| s.is_locked()).collect()
    }

    pub fn regeneratable_sections(&self) -> Vec<&ProjectedSection> {
        self.sections.iter().filter(|s| s.can_regenerate()).collect()
    }

    /// Regeneratable sections whose snapshot differs from `current_ids`.
    pub fn stale_sections(&self, current_ids: &[String]) -> Vec<&ProjectedSection> {
        self.sections
            .iter()
            .filter(|s| s.can_regenerate() && s.is_stale(current_ids))
            .collect()
    }

    // ── versioning ─────────────────────────────────────────────────────

    /// Record the current state, bump the version, and adopt `content_ids`
    /// as the new content snapshot.
    pub fn mark_updated(
        &mut self,
        content_ids: Vec<String>,
        trigger: ProjectionTrigger,
        update_mode: Option<UpdateMode>,
        change_summary: impl Into<String>,
    ) {
        self.version_history.push(ProjectionVersion {
            version: self.version,
            created_at: Utc::now(),
            trigger,
            update_mode,
            section_count: self.sections.len(),
            word_count: self.word_count,
            content_item_count: self.content_snapshot_ids.len(),
            change_summary: change_summary.into(),
        });
        self.version += 1;
        self.last_regenerated = Some(Utc::now());
        self.content_snapshot_ids = content_ids;
        self.refresh_stats();
    }

    // ── queries ────────────────────────────────────────────────────────

    /// Markdown rendering of all non-empty sections, in order.
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .filter(|s| !s.content().is_empty())
            .map(|s| format!("## {}\n\n{}", s.title, s.content()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn status(&self) -> ProjectionStatus {
        ProjectionStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version,
            sections_count: self.sections.len(),
            locked_count: self.locked_sections().len(),
            word_count: self.word_count,
            last_updated: self.updated_at,
            last_regenerated: self.last_regenerated,
            content_items_used: self.content_snapshot_ids.len(),
            themes_count: self.context.themes.len(),
        }
    }

    /// Preview of an update against `current_ids`. Does not mutate.
    pub fn update_options(&self, current_ids: &[String]) -> UpdateOptions {
        let stale = self.stale_sections(current_ids);
        let regeneratable = self.regeneratable_sections().len();
        let locked = self.locked_sections();

        let snapshot: HashSet<&str> = self.content_snapshot_ids.iter().map(String::as_str).collect();
        let new_content_count = current_ids
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>()
            .difference(&snapshot)
            .count();

        let available_modes = UpdateMode::ALL
            .iter()
            .map(|&mode| ModeOption {
                mode,
                description: mode.description(),
                affects_sections: match mode {
                    UpdateMode::Regenerate => regeneratable,
                    UpdateMode::Evolve | UpdateMode::Refresh | UpdateMode::Append => stale.len(),
                },
            })
            .collect();

        UpdateOptions {
            has_new_content: new_content_count > 0,
            new_content_count,
            stale_section_count: stale.len(),
            stale_section_ids: stale.iter().map(|s| s.id.clone()).collect(),
            regeneratable_count: regeneratable,
            locked_count: locked.len(),
            locked_section_ids: locked.iter().map(|s| s.id.clone()).collect(),
            available_modes,
        }
    }

    // ── contributors ───────────────────────────────────────────────────

    pub fn update_contributor_summary(&mut self, contributors: &BTreeMap<String, ContributorInfo>) {
        self.contributor_ids = contributors.keys().cloned().collect();
        for (id, info) in contributors {
            let sections_contributed = self
                .sections
                .iter()
                .filter(|s| s.contributor_ids().contains(id))
                .count();
            let role = info.role.clone().unwrap_or_else(|| "family".to_string());
            let is_subject = role == "subject"
                || self.config.subject_contributor_id.as_deref() == Some(id.as_str());
            self.contributor_summary.insert(
                id.clone(),
                ContributorSummary {
                    name: info.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                    role,
                    relationship: info.relationship.clone(),
                    sections_contributed,
                    is_subject,
                },
            );
        }
    }

    pub fn contributor_sections(&self, contributor_id: &str) -> Vec<&ProjectedSection> {
        self.sections
            .iter()
            .filter(|s| s.contributor_ids().iter().any(|c| c == contributor_id))
            .collect()
    }

    /// Contributor id → titles of the sections they contributed to.
    pub fn contributions_by_contributor(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for section in &self.sections {
            for contributor in section.contributor_ids() {
                out.entry(contributor.clone())
                    .or_default()
                    .push(section.title.clone());
            }
        }
        out
    }

    fn renumber(&mut self) {
        for (i, section) in self.sections.iter_mut().enumerate() {
            section.order = i;
        }
    }

    fn refresh_stats(&mut self) {
        self.word_count = self.sections.iter().map(ProjectedSection::word_count).sum();
        self.updated_at = Utc::now();
    }
}
