//! Projected sections: the addressable units of a document.
//!
//! # State machine
//!
//! ```text
//!   EMPTY ──synthesis──▶ GENERATED ──lock──▶ LOCKED
//!     │                   │   ▲                 │
//!     │                   │   └─────unlock──────┘
//!     └──start_editing──▶ DRAFT ◀──start_editing┘(GENERATED)
//!                          │
//!                          └──finish_editing──▶ GENERATED | LOCKED
//! ```
//!
//! Content-path updates ([`ProjectedSection::update_content`]) are only
//! accepted in EMPTY or GENERATED. Every content mutation first pushes the
//! current content into the bounded history, then bumps `version` by one.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, ProjectionResult};
use crate::history::{deserialize_bounded, BoundedHistory, SECTION_HISTORY_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionState {
    /// Placeholder waiting for relevant content.
    Empty,
    /// Machine-written; eligible for regeneration.
    Generated,
    /// Human-approved; frozen until explicitly unlocked.
    Locked,
    /// Being edited by a person.
    Draft,
}

impl fmt::Display for SectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionState::Empty => "empty",
            SectionState::Generated => "generated",
            SectionState::Locked => "locked",
            SectionState::Draft => "draft",
        };
        f.write_str(s)
    }
}

/// What produced a given version of a section's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionTrigger {
    Generation,
    Regeneration,
    Evolution,
    ManualEdit,
    Append,
    Refresh,
    Revert,
}

impl VersionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionTrigger::Generation => "generation",
            VersionTrigger::Regeneration => "regeneration",
            VersionTrigger::Evolution => "evolution",
            VersionTrigger::ManualEdit => "manual_edit",
            VersionTrigger::Append => "append",
            VersionTrigger::Refresh => "refresh",
            VersionTrigger::Revert => "revert",
        }
    }
}

impl fmt::Display for VersionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a past section state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionVersion {
    pub version: u32,
    pub content: String,
    pub summary: String,
    pub trigger: VersionTrigger,
    pub source_content_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// `None` for machine-written versions.
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
    pub reason: String,
}

/// New content for a content-path update.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionUpdate {
    pub content: String,
    pub summary: String,
    pub source_content_ids: Vec<String>,
    pub contributor_ids: Vec<String>,
    /// Content ids present when this content was produced; basis for staleness.
    pub snapshot_ids: Vec<String>,
    pub trigger: VersionTrigger,
}

fn section_history() -> BoundedHistory<SectionVersion> {
    BoundedHistory::with_capacity(SECTION_HISTORY_CAPACITY)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedSection {
    pub id: String,
    pub title: String,
    content: String,
    summary: String,
    source_content_ids: Vec<String>,
    contributor_ids: Vec<String>,
    #[serde(default)]
    primary_contributor_id: Option<String>,
    state: SectionState,
    #[serde(default)]
    lock: Option<LockInfo>,
    pub(crate) order: usize,
    version: u32,
    #[serde(
        default = "section_history",
        deserialize_with = "deserialize_bounded::<_, _, SECTION_HISTORY_CAPACITY>"
    )]
    history: BoundedHistory<SectionVersion>,
    last_content_snapshot: Vec<String>,
    trigger: VersionTrigger,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    generated_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl ProjectedSection {
    /// An EMPTY section at version 1.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: format!("sec_{}", uuid::Uuid::new_v4().simple()),
            title: title.into(),
            content: String::new(),
            summary: String::new(),
            source_content_ids: Vec::new(),
            contributor_ids: Vec::new(),
            primary_contributor_id: None,
            state: SectionState::Empty,
            lock: None,
            order: 0,
            version: 1,
            history: section_history(),
            last_content_snapshot: Vec::new(),
            trigger: VersionTrigger::Generation,
            author: None,
            generated_at: None,
            updated_at: Utc::now(),
        }
    }

    /// A freshly synthesized section at version 1.
    ///
    /// The section is GENERATED when `update.content` is non-empty and EMPTY
    /// otherwise. No history entry is written.
    pub fn generated(title: impl Into<String>, update: SectionUpdate) -> Self {
        let mut section = Self::new(title);
        section.state = if update.content.trim().is_empty() {
            SectionState::Empty
        } else {
            SectionState::Generated
        };
        section.content = update.content;
        section.summary = update.summary;
        section.source_content_ids = update.source_content_ids;
        section.contributor_ids = update.contributor_ids;
        section.last_content_snapshot = update.snapshot_ids;
        section.trigger = update.trigger;
        section.generated_at = Some(Utc::now());
        section
    }

    pub fn with_primary_contributor(mut self, contributor_id: impl Into<String>) -> Self {
        self.primary_contributor_id = Some(contributor_id.into());
        self
    }

    // ── accessors ──────────────────────────────────────────────────────

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn source_content_ids(&self) -> &[String] {
        &self.source_content_ids
    }

    pub fn contributor_ids(&self) -> &[String] {
        &self.contributor_ids
    }

    pub fn primary_contributor_id(&self) -> Option<&str> {
        self.primary_contributor_id.as_deref()
    }

    pub fn state(&self) -> SectionState {
        self.state
    }

    pub fn lock_info(&self) -> Option<&LockInfo> {
        self.lock.as_ref()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn history(&self) -> &BoundedHistory<SectionVersion> {
        &self.history
    }

    pub fn last_content_snapshot(&self) -> &[String] {
        &self.last_content_snapshot
    }

    pub fn trigger(&self) -> VersionTrigger {
        self.trigger
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.generated_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn is_locked(&self) -> bool {
        self.state == SectionState::Locked
    }

    pub fn can_regenerate(&self) -> bool {
        matches!(self.state, SectionState::Empty | SectionState::Generated)
    }

    /// True when `current_ids` and the last content snapshot differ as sets.
    pub fn is_stale(&self, current_ids: &[String]) -> bool {
        let current: HashSet<&str> = current_ids.iter().map(String::as_str).collect();
        let snapshot: HashSet<&str> = self
            .last_content_snapshot
            .iter()
            .map(String::as_str)
            .collect();
        current != snapshot
    }

    /// Snapshot ids not yet seen by this section, in `current_ids` order.
    pub fn unseen<'a>(&self, current_ids: &'a [String]) -> Vec<&'a String> {
        let seen: HashSet<&str> = self
            .last_content_snapshot
            .iter()
            .map(String::as_str)
            .collect();
        current_ids
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .collect()
    }

    // ── lock / edit transitions ────────────────────────────────────────

    /// Lock the section against automated updates.
    ///
    /// Locking an already-locked section replaces the lock metadata.
    pub fn lock(&mut self, user_id: &str, reason: &str) {
        self.state = SectionState::Locked;
        self.lock = Some(LockInfo {
            locked_at: Utc::now(),
            locked_by: user_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn unlock(&mut self) -> ProjectionResult<()> {
        if self.state != SectionState::Locked {
            return Err(self.invalid("unlock"));
        }
        self.state = SectionState::Generated;
        self.lock = None;
        Ok(())
    }

    pub fn start_editing(&mut self) -> ProjectionResult<()> {
        match self.state {
            SectionState::Empty | SectionState::Generated | SectionState::Draft => {
                self.state = SectionState::Draft;
                Ok(())
            }
            SectionState::Locked => Err(self.invalid("start editing")),
        }
    }

    /// Replace the content with a human edit, optionally locking it.
    ///
    /// The staleness snapshot is left untouched: a manual edit says nothing
    /// about which content the prose reflects.
    pub fn finish_editing(&mut self, new_content: String, lock: bool, user_id: Option<&str>) {
        self.save_to_history();
        self.content = new_content;
        self.trigger = VersionTrigger::ManualEdit;
        self.author = user_id.map(str::to_string);
        self.bump();

        if lock {
            self.lock(user_id.unwrap_or("unknown"), "manually edited");
        } else {
            self.state = SectionState::Generated;
            self.lock = None;
        }
    }

    // ── content path ───────────────────────────────────────────────────

    /// Apply machine-produced content.
    ///
    /// Fails with [`ProjectionError::InvalidTransition`] unless the section
    /// is EMPTY or GENERATED.
    pub fn update_content(&mut self, update: SectionUpdate) -> ProjectionResult<()> {
        if !self.can_regenerate() {
            return Err(self.invalid("regenerate"));
        }
        self.save_to_history();
        self.state = if update.content.trim().is_empty() {
            SectionState::Empty
        } else {
            SectionState::Generated
        };
        self.content = update.content;
        self.summary = update.summary;
        self.source_content_ids = update.source_content_ids;
        self.contributor_ids = update.contributor_ids;
        self.last_content_snapshot = update.snapshot_ids;
        self.trigger = update.trigger;
        self.author = None;
        self.generated_at = Some(Utc::now());
        self.bump();
        Ok(())
    }

    /// Record that `snapshot_ids` were considered without changing content.
    ///
    /// Used when an incremental update finds nothing new that is relevant
    /// to this section. Not a content mutation: `version` is unchanged.
    pub fn acknowledge_snapshot(&mut self, snapshot_ids: Vec<String>) -> ProjectionResult<()> {
        if !self.can_regenerate() {
            return Err(self.invalid("refresh snapshot of"));
        }
        self.last_content_snapshot = snapshot_ids;
        Ok(())
    }

    /// Restore the content of a past version, recording the revert as a new
    /// version.
    pub fn revert_to_version(&mut self, version: u32) -> ProjectionResult<()> {
        let target = self
            .history
            .find(|h| h.version == version)
            .cloned()
            .ok_or_else(|| ProjectionError::VersionNotFound {
                section_id: self.id.clone(),
                version,
            })?;

        self.save_to_history();
        self.content = target.content;
        self.summary = target.summary;
        self.last_content_snapshot = target.source_content_ids.clone();
        self.source_content_ids = target.source_content_ids;
        self.author = target.created_by;
        self.trigger = VersionTrigger::Revert;
        if self.state == SectionState::Empty && !self.content.trim().is_empty() {
            self.state = SectionState::Generated;
        }
        self.bump();
        Ok(())
    }

    fn save_to_history(&mut self) {
        if self.content.is_empty() {
            return;
        }
        self.history.push(SectionVersion {
            version: self.version,
            content: self.content.clone(),
            summary: self.summary.clone(),
            trigger: self.trigger,
            source_content_ids: self.source_content_ids.clone(),
            created_at: self.updated_at,
            created_by: self.author.clone(),
        });
    }

    fn bump(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn invalid(&self, action: &'static str) -> ProjectionError {
        ProjectionError::InvalidTransition {
            section_id: self.id.clone(),
            from: self.state,
            action,
        }
    }
}
