//! The content-synthesis contract and its deterministic fallbacks.
//!
//! The engine never writes prose itself. It asks a [`Synthesizer`] to
//! generate a section, integrate new material into existing prose, or
//! extract themes. When the synthesizer fails, the `*_or_fallback`
//! helpers substitute a deterministic transformation of the input so the
//! update still completes and the versioning invariants still advance.
//!
//! Concrete synthesizers (disabled, OpenAI-compatible HTTP) live in the
//! `memoir-projections` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{DiscoveredTheme, ThemeExtraction};
use crate::projection::ProjectionLength;

/// Characters of the first text shown in fallback prose.
pub const FALLBACK_EXCERPT_CHARS: usize = 200;

/// Maximum number of themes the keyword fallback reports.
pub const FALLBACK_THEME_LIMIT: usize = 5;

/// Inputs for synthesizing a section from raw content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub topic: String,
    /// Extracted texts of the relevant content items, in order.
    pub texts: Vec<String>,
    pub style_guidance: String,
    pub narrative_context: String,
    pub target_length: ProjectionLength,
}

impl GenerateRequest {
    /// The texts joined by blank lines.
    pub fn raw_text(&self) -> String {
        self.texts.join("\n\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub content: String,
    #[serde(default)]
    pub summary: String,
}

/// Inputs for weaving new content into existing prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrateRequest {
    pub topic: String,
    pub existing_content: String,
    pub new_texts: Vec<String>,
    pub style_guidance: String,
    pub target_length: ProjectionLength,
}

impl IntegrateRequest {
    pub fn new_raw_text(&self) -> String {
        self.new_texts.join("\n\n")
    }
}

/// A capability that turns raw collected text into prose.
///
/// Implementations must be safe to call concurrently and must not hold
/// references to caller state. Returning `Err` tells the caller to apply
/// its deterministic fallback.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Identifier used in logs (e.g. `"disabled"`, `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedSection>;

    async fn integrate(&self, request: &IntegrateRequest) -> Result<String>;

    async fn extract_themes(&self, raw_text: &str, existing_themes: &[String]) -> Result<ThemeExtraction>;
}

// ═══════════════════════════════════════════════════════════════════════
// Fallback-aware calls
// ═══════════════════════════════════════════════════════════════════════

/// Generate a section, falling back to [`fallback_section`] on failure.
///
/// Empty input yields empty content without calling the synthesizer.
pub async fn generate_or_fallback(synth: &dyn Synthesizer, request: &GenerateRequest) -> GeneratedSection {
    if request.texts.is_empty() {
        return GeneratedSection::default();
    }
    match synth.generate(request).await {
        Ok(section) if !section.content.trim().is_empty() => section,
        Ok(_) => {
            tracing::warn!(
                synthesizer = synth.name(),
                topic = %request.topic,
                "synthesizer returned empty content, using fallback"
            );
            fallback_section(request)
        }
        Err(e) => {
            tracing::warn!(
                synthesizer = synth.name(),
                topic = %request.topic,
                error = %e,
                "section generation failed, using fallback"
            );
            fallback_section(request)
        }
    }
}

/// Integrate new texts into existing prose, falling back to
/// [`fallback_integration`] on failure.
pub async fn integrate_or_fallback(synth: &dyn Synthesizer, request: &IntegrateRequest) -> String {
    if request.new_texts.is_empty() {
        return request.existing_content.clone();
    }
    match synth.integrate(request).await {
        Ok(content) if !content.trim().is_empty() => content,
        Ok(_) => {
            tracing::warn!(
                synthesizer = synth.name(),
                topic = %request.topic,
                "synthesizer returned empty integration, using fallback"
            );
            fallback_integration(request)
        }
        Err(e) => {
            tracing::warn!(
                synthesizer = synth.name(),
                topic = %request.topic,
                error = %e,
                "integration failed, using fallback"
            );
            fallback_integration(request)
        }
    }
}

/// Extract themes, falling back to [`keyword_themes`] on failure or when
/// the synthesizer reports none.
pub async fn extract_or_fallback(synth: &dyn Synthesizer, texts: &[String], existing_themes: &[String]) -> ThemeExtraction {
    if texts.is_empty() {
        return ThemeExtraction::default();
    }
    let raw = texts.join("\n\n");
    match synth.extract_themes(&raw, existing_themes).await {
        Ok(extraction) if !extraction.themes.is_empty() => extraction,
        Ok(mut extraction) => {
            extraction.themes = keyword_themes(texts);
            extraction
        }
        Err(e) => {
            tracing::warn!(
                synthesizer = synth.name(),
                error = %e,
                "theme extraction failed, using keyword fallback"
            );
            ThemeExtraction {
                themes: keyword_themes(texts),
                ..Default::default()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Deterministic fallbacks
// ═══════════════════════════════════════════════════════════════════════

/// At most `max_chars` characters of `text`, with `...` when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Placeholder prose: the topic, the item count, and an excerpt of the
/// first text.
pub fn fallback_section(request: &GenerateRequest) -> GeneratedSection {
    let n = request.texts.len();
    let preview = request
        .texts
        .first()
        .map(|t| excerpt(t, FALLBACK_EXCERPT_CHARS))
        .unwrap_or_default();
    let content = format!(
        "*[{} section about \"{}\"]*\n\nBased on {} content item{}.\n\n{}",
        request.target_length.target(),
        request.topic,
        n,
        if n == 1 { "" } else { "s" },
        preview
    );
    GeneratedSection {
        content,
        summary: format!("{} ({} content item{})", request.topic, n, if n == 1 { "" } else { "s" }),
    }
}

/// Existing prose followed by fallback prose for the new texts, behind a
/// visible separator.
pub fn fallback_integration(request: &IntegrateRequest) -> String {
    let addition = fallback_section(&GenerateRequest {
        topic: request.topic.clone(),
        texts: request.new_texts.clone(),
        style_guidance: request.style_guidance.clone(),
        narrative_context: String::new(),
        target_length: request.target_length,
    });
    if request.existing_content.trim().is_empty() {
        return addition.content;
    }
    format!(
        "{}\n\n---\n\n*[New content integrated:]*\n\n{}",
        request.existing_content, addition.content
    )
}

const THEME_KEYWORDS: &[(&str, &[&str])] = &[
    ("Family", &["family", "mother", "father", "parent", "sibling"]),
    ("Education", &["school", "learn", "teacher", "study"]),
    ("Career", &["work", "job", "career", "profession"]),
    ("Friendship", &["friend", "together", "companion"]),
];

/// Keyword-based theme detection.
///
/// A theme is reported when at least two of its keywords occur; its
/// strength is `0.25` per matched keyword, capped at `1.0`.
pub fn keyword_themes(texts: &[String]) -> Vec<DiscoveredTheme> {
    if texts.is_empty() {
        return Vec::new();
    }
    let all = texts.join(" ").to_lowercase();
    THEME_KEYWORDS
        .iter()
        .filter_map(|(name, keywords)| {
            let matches: Vec<&str> = keywords.iter().copied().filter(|k| all.contains(k)).collect();
            (matches.len() >= 2).then(|| {
                DiscoveredTheme::new(*name)
                    .with_description(format!("Detected via keywords: {}", matches.join(", ")))
                    .with_strength((matches.len() as f32 * 0.25).min(1.0))
            })
        })
        .take(FALLBACK_THEME_LIMIT)
        .collect()
}

/// Section titles for a thematic projection with no suggestions and no
/// discovered themes.
///
/// `has_items` distinguishes an empty pool from items that carry no text.
pub fn default_section_titles(has_items: bool, texts: &[String]) -> Vec<String> {
    if !has_items {
        return ["Introduction", "Story", "Reflections"]
            .iter()
            .map(|s| s.to_string())
            .collect();
    }
    let all = texts.join(" ").to_lowercase();
    let rules: &[(&str, &[&str])] = &[
        ("Family", &["family", "mother", "father"]),
        ("Education", &["school", "education", "learn"]),
        ("Career", &["work", "career", "job"]),
        ("Friendships", &["friend", "friendship"]),
    ];
    let titles: Vec<String> = rules
        .iter()
        .filter(|(_, words)| words.iter().any(|w| all.contains(w)))
        .map(|(title, _)| title.to_string())
        .collect();
    if titles.is_empty() {
        vec!["Memories".to_string(), "Reflections".to_string()]
    } else {
        titles
    }
}
