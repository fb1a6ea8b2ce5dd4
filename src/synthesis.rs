//! Synthesis providers.
//!
//! Concrete implementations of the core [`Synthesizer`] trait:
//! - **[`DisabledSynthesizer`]**: fails every call, so the engine applies its
//!   deterministic fallbacks. Used when `synthesis.provider = "disabled"`.
//! - **[`OpenAISynthesizer`]**: calls an OpenAI-compatible chat completions
//!   endpoint with retry and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use memoir_projections_core::context::{DiscoveredTheme, ThemeExtraction};
use memoir_projections_core::synthesis::{
    GenerateRequest, GeneratedSection, IntegrateRequest, Synthesizer,
};

use crate::config::SynthesisConfig;

/// A synthesizer that always fails.
pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GeneratedSection> {
        bail!("Synthesis provider is disabled")
    }

    async fn integrate(&self, _request: &IntegrateRequest) -> Result<String> {
        bail!("Synthesis provider is disabled")
    }

    async fn extract_themes(&self, _raw_text: &str, _existing: &[String]) -> Result<ThemeExtraction> {
        bail!("Synthesis provider is disabled")
    }
}

/// Synthesizer backed by `POST {base_url}/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAISynthesizer {
    name: String,
    model: String,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAISynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("synthesis.model required for OpenAI provider"))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            name: format!("openai:{}", model),
            model,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn complete(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(attempt, %status, "synthesis request will be retried");
                        last_err = Some(anyhow!("Synthesis API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Synthesis API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Synthesis failed after retries")))
    }
}

#[async_trait]
impl Synthesizer for OpenAISynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedSection> {
        let system = format!(
            "You write one section of a memoir. Style: {}. Length: {}.",
            request.style_guidance,
            request.target_length.target()
        );
        let mut user = format!("Topic: {}\n\n", request.topic);
        if !request.narrative_context.is_empty() {
            user.push_str(&format!("Context so far:\n{}\n\n", request.narrative_context));
        }
        user.push_str(&format!(
            "Collected memories:\n{}\n\nWrite the section prose only.",
            request.raw_text()
        ));

        let content = self.complete(&system, &user, false).await?;
        let content = content.trim().to_string();
        let summary = first_sentence(&content);
        Ok(GeneratedSection { content, summary })
    }

    async fn integrate(&self, request: &IntegrateRequest) -> Result<String> {
        let system = format!(
            "You revise one section of a memoir, weaving in new memories while keeping the \
             existing structure and wording wherever possible. Style: {}. Length: {}.",
            request.style_guidance,
            request.target_length.target()
        );
        let user = format!(
            "Topic: {}\n\nExisting section:\n{}\n\nNew memories:\n{}\n\nReturn the full revised section.",
            request.topic,
            request.existing_content,
            request.new_raw_text()
        );
        Ok(self.complete(&system, &user, false).await?.trim().to_string())
    }

    async fn extract_themes(&self, raw_text: &str, existing: &[String]) -> Result<ThemeExtraction> {
        let system = "You analyze memoir material. Reply with a JSON object with keys \
                      \"themes\" (array of {\"theme\", \"description\", \"evidence\", \"strength\"}), \
                      \"key_facts\" (object), \"suggested_topics\" (array of strings), and \
                      \"emotional_tone\" (string).";
        let user = format!(
            "Known themes: {}\n\nMaterial:\n{}",
            if existing.is_empty() {
                "none".to_string()
            } else {
                existing.join(", ")
            },
            raw_text
        );
        let reply = self.complete(system, &user, true).await?;
        parse_extraction(&reply)
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid synthesis response: missing choices[0].message.content"))
}

/// Parse a theme-extraction reply. Unknown keys are ignored; a missing
/// `themes` array is an empty extraction.
fn parse_extraction(reply: &str) -> Result<ThemeExtraction> {
    let value: serde_json::Value = serde_json::from_str(reply.trim())?;
    let mut extraction = ThemeExtraction::default();

    if let Some(themes) = value.get("themes").and_then(|t| t.as_array()) {
        for t in themes {
            let Some(name) = t.get("theme").and_then(|n| n.as_str()) else {
                continue;
            };
            let evidence = t
                .get("evidence")
                .and_then(|e| e.as_array())
                .map(|e| e.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let strength = t.get("strength").and_then(|s| s.as_f64()).unwrap_or(1.0) as f32;
            extraction.themes.push(
                DiscoveredTheme::new(name)
                    .with_description(t.get("description").and_then(|d| d.as_str()).unwrap_or(""))
                    .with_evidence(evidence)
                    .with_strength(strength),
            );
        }
    }

    if let Some(facts) = value.get("key_facts").and_then(|f| f.as_object()) {
        extraction
            .key_facts
            .extend(facts.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if let Some(topics) = value.get("suggested_topics").and_then(|t| t.as_array()) {
        extraction.suggested_topics = topics
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
    }

    if let Some(tone) = value.get("emotional_tone").and_then(|t| t.as_str()) {
        extraction.emotional_tone = tone.to_string();
    }

    Ok(extraction)
}

fn first_sentence(content: &str) -> String {
    let end = content
        .find(|c| c == '.' || c == '\n')
        .map(|i| i + 1)
        .unwrap_or(content.len());
    content[..end].trim().to_string()
}

/// Create the [`Synthesizer`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledSynthesizer`] |
/// | `"openai"` | [`OpenAISynthesizer`] |
pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Arc<dyn Synthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSynthesizer)),
        "openai" => Ok(Arc::new(OpenAISynthesizer::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}
