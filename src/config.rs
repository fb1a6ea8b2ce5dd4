//! TOML configuration for the projection engine and the `memoir` binary.
//!
//! Every table is optional; a missing file section falls back to its
//! defaults. [`load_config`] validates values and fails before anything
//! runs, so a bad style or mode never causes a partial update.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use memoir_projections_core::projection::{
    MergeStrategy, ProjectionConfig, ProjectionLength, ProjectionStyle, UpdateMode,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub projection: ProjectionDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl SynthesisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_synthesis: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_synthesis: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

/// Defaults applied to projections created without an explicit config.
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectionDefaults {
    #[serde(default)]
    pub style: ProjectionStyle,
    #[serde(default)]
    pub length: ProjectionLength,
    #[serde(default)]
    pub default_update_mode: UpdateMode,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
    #[serde(default)]
    pub voice_guidance: Option<String>,
}

impl Default for ProjectionDefaults {
    fn default() -> Self {
        Self {
            style: ProjectionStyle::default(),
            length: ProjectionLength::default(),
            default_update_mode: UpdateMode::default(),
            merge_strategy: MergeStrategy::default(),
            max_sections: default_max_sections(),
            voice_guidance: None,
        }
    }
}

fn default_max_sections() -> usize {
    20
}

impl ProjectionDefaults {
    pub fn to_projection_config(&self) -> ProjectionConfig {
        ProjectionConfig {
            style: self.style,
            length: self.length,
            default_update_mode: self.default_update_mode,
            merge_strategy: self.merge_strategy,
            max_sections: self.max_sections,
            voice_guidance: self.voice_guidance.clone(),
            ..ProjectionConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.engine.max_concurrent_synthesis == 0 {
        anyhow::bail!("engine.max_concurrent_synthesis must be >= 1");
    }

    if config.projection.max_sections == 0 {
        anyhow::bail!("projection.max_sections must be >= 1");
    }

    match config.synthesis.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.synthesis.is_enabled() && config.synthesis.model.is_none() {
        anyhow::bail!(
            "synthesis.model must be specified when provider is '{}'",
            config.synthesis.provider
        );
    }

    match config.logging.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!("Unknown logging.level: '{}'", other),
    }

    Ok(config)
}
