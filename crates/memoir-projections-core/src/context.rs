//! Narrative context: the accumulated understanding of a project's content.
//!
//! Themes only ever strengthen or gain evidence. Re-observing a theme with
//! an existing name (case-insensitive) merges into the existing entry
//! instead of adding a duplicate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strength added to an existing theme each time it is observed again.
pub const THEME_STRENGTH_INCREMENT: f32 = 0.1;

/// Number of themes included when rendering the context for synthesis.
pub const CONTEXT_THEME_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTheme {
    pub theme: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default)]
    pub source_content_ids: Vec<String>,
}

fn default_strength() -> f32 {
    1.0
}

impl DiscoveredTheme {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            description: String::new(),
            evidence: Vec::new(),
            strength: default_strength(),
            source_content_ids: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_sources(mut self, ids: Vec<String>) -> Self {
        self.source_content_ids = ids;
        self
    }
}

/// Output of a theme-extraction pass over some raw text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeExtraction {
    #[serde(default)]
    pub themes: Vec<DiscoveredTheme>,
    #[serde(default)]
    pub key_facts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub suggested_topics: Vec<String>,
    #[serde(default)]
    pub emotional_tone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_facts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub themes: Vec<DiscoveredTheme>,
    #[serde(default)]
    pub suggested_topics: Vec<String>,
    #[serde(default)]
    pub covered_topics: Vec<String>,
    #[serde(default = "default_tone")]
    pub emotional_tone: String,
    #[serde(default)]
    pub voice_notes: String,
    pub updated_at: DateTime<Utc>,
}

fn default_tone() -> String {
    "neutral".to_string()
}

impl Default for NarrativeContext {
    fn default() -> Self {
        Self {
            summary: String::new(),
            key_facts: BTreeMap::new(),
            themes: Vec::new(),
            suggested_topics: Vec::new(),
            covered_topics: Vec::new(),
            emotional_tone: default_tone(),
            voice_notes: String::new(),
            updated_at: Utc::now(),
        }
    }
}

impl NarrativeContext {
    /// Add a theme, merging into an existing one with the same name.
    pub fn add_theme(&mut self, candidate: DiscoveredTheme) {
        let name = candidate.theme.trim();
        if name.is_empty() {
            return;
        }
        let key = name.to_lowercase();
        if let Some(existing) = self
            .themes
            .iter_mut()
            .find(|t| t.theme.trim().to_lowercase() == key)
        {
            for snippet in candidate.evidence {
                if !existing.evidence.contains(&snippet) {
                    existing.evidence.push(snippet);
                }
            }
            for id in candidate.source_content_ids {
                if !existing.source_content_ids.contains(&id) {
                    existing.source_content_ids.push(id);
                }
            }
            existing.strength = (existing.strength + THEME_STRENGTH_INCREMENT).min(1.0);
            if existing.description.is_empty() {
                existing.description = candidate.description;
            }
            return;
        }
        let mut theme = candidate;
        theme.strength = theme.strength.clamp(0.0, 1.0);
        self.themes.push(theme);
    }

    /// Fold an extraction result over content `source_ids` into this context.
    ///
    /// Themes merge via [`add_theme`](Self::add_theme), key facts overwrite
    /// by name, suggested topics are appended without duplicates, and the
    /// tone is replaced when the extraction reports one.
    pub fn absorb(&mut self, extraction: ThemeExtraction, source_ids: &[String]) {
        for mut theme in extraction.themes {
            if theme.source_content_ids.is_empty() {
                theme.source_content_ids = source_ids.to_vec();
            }
            self.add_theme(theme);
        }
        self.key_facts.extend(extraction.key_facts);
        for topic in extraction.suggested_topics {
            if !self.suggested_topics.contains(&topic) {
                self.suggested_topics.push(topic);
            }
        }
        if !extraction.emotional_tone.trim().is_empty() {
            self.emotional_tone = extraction.emotional_tone;
        }
        self.touch();
    }

    pub fn mark_covered(&mut self, topic: &str) {
        if !self.covered_topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
            self.covered_topics.push(topic.to_string());
        }
    }

    pub fn theme_names(&self) -> Vec<String> {
        self.themes.iter().map(|t| t.theme.clone()).collect()
    }

    /// Compact rendering fed to section synthesis for continuity.
    pub fn render_compact(&self) -> String {
        let mut out = self.summary.clone();
        if !self.themes.is_empty() {
            let names: Vec<&str> = self
                .themes
                .iter()
                .take(CONTEXT_THEME_LIMIT)
                .map(|t| t.theme.as_str())
                .collect();
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("Key themes: ");
            out.push_str(&names.join(", "));
        }
        out
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
