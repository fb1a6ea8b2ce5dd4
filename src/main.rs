//! # Memoir Projections CLI (`memoir`)
//!
//! Generates, previews, updates, and renders document projections from
//! content exported as JSON. Projection files are read and written as
//! JSON; nothing is persisted between runs.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memoir generate` | Build a projection from a content file |
//! | `memoir options` | Preview what each update mode would touch |
//! | `memoir update` | Apply an update mode to a projection |
//! | `memoir render` | Print a projection as markdown |
//! | `memoir history` | Print a section's version history |
//! | `memoir lock` / `memoir unlock` | Protect or release a section |
//!
//! ## Examples
//!
//! ```bash
//! memoir generate --content items.json --name "Full Memoir" --output memoir.json
//! memoir options --projection memoir.json --content items.json
//! memoir update --projection memoir.json --content items.json --mode evolve --output memoir.json
//! memoir render --projection memoir.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use memoir_projections::config::{self, Config};
use memoir_projections::service::ProjectionService;
use memoir_projections_core::models::ContentItem;
use memoir_projections_core::projection::{
    DocumentProjection, ProjectionLength, ProjectionStyle, UpdateMode,
};

/// Memoir Projections: regenerable, lockable documents over collected
/// life-story content.
#[derive(Parser)]
#[command(name = "memoir", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new projection from a content file.
    Generate {
        /// JSON array of content items.
        #[arg(long)]
        content: PathBuf,
        #[arg(long)]
        name: String,
        /// Project to project; defaults to the first item's project.
        #[arg(long)]
        project: Option<String>,
        /// chronological | thematic | by_contributor
        #[arg(long)]
        style: Option<String>,
        /// summary | standard | comprehensive
        #[arg(long)]
        length: Option<String>,
        /// Comma-separated section titles (thematic style).
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show update options for a projection against a content file.
    Options {
        #[arg(long)]
        projection: PathBuf,
        #[arg(long)]
        content: PathBuf,
    },

    /// Apply an update mode to a projection.
    Update {
        #[arg(long)]
        projection: PathBuf,
        #[arg(long)]
        content: PathBuf,
        /// regenerate | evolve | refresh | append (default: projection's default)
        #[arg(long)]
        mode: Option<String>,
        /// Restrict the update to these section ids.
        #[arg(long = "section")]
        sections: Vec<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print a projection as markdown.
    Render {
        #[arg(long)]
        projection: PathBuf,
    },

    /// Print the version history of one section.
    History {
        #[arg(long)]
        projection: PathBuf,
        #[arg(long)]
        section: String,
    },

    /// Lock a section against automated updates.
    Lock {
        #[arg(long)]
        projection: PathBuf,
        #[arg(long)]
        section: String,
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long, default_value = "approved")]
        reason: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Unlock a locked section.
    Unlock {
        #[arg(long)]
        projection: PathBuf,
        #[arg(long)]
        section: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    init_logging(&cfg.logging.level);

    let service = ProjectionService::in_memory(&cfg)?;

    match cli.command {
        Commands::Generate {
            content,
            name,
            project,
            style,
            length,
            sections,
            output,
        } => {
            let items = read_content(&content)?;
            let project_id = match project.or_else(|| items.first().map(|i| i.project_id.clone())) {
                Some(p) => p,
                None => bail!("No project given and {} has no items", content.display()),
            };
            ingest(&service, items).await?;

            let mut pc = cfg.projection.to_projection_config();
            if let Some(style) = style {
                pc.style = style.parse::<ProjectionStyle>()?;
            }
            if let Some(length) = length {
                pc.length = length.parse::<ProjectionLength>()?;
            }
            if !sections.is_empty() {
                pc.suggested_sections = Some(sections);
            }

            let proj = service.create_projection(&project_id, &name, pc).await?;
            write_json(&proj, output.as_deref())?;
        }
        Commands::Options {
            projection,
            content,
        } => {
            let proj = load_into(&service, &projection, Some(&content)).await?;
            let options = service.update_options(&proj.id).await?;
            write_json(&options, None)?;
        }
        Commands::Update {
            projection,
            content,
            mode,
            sections,
            output,
        } => {
            let mode = mode.map(|m| m.parse::<UpdateMode>()).transpose()?;
            let proj = load_into(&service, &projection, Some(&content)).await?;
            let scope = (!sections.is_empty()).then_some(sections.as_slice());
            let (updated, report) = service.update(&proj.id, mode, scope).await?;
            eprintln!(
                "{}: updated {} section(s), {} new content item(s), now version {}",
                report.mode,
                report.updated_section_ids.len(),
                report.new_content_count,
                report.version
            );
            write_json(&updated, output.as_deref())?;
        }
        Commands::Render { projection } => {
            let proj = load_into(&service, &projection, None).await?;
            println!("# {}\n", proj.name);
            println!("{}", service.render(&proj.id).await?);
        }
        Commands::History {
            projection,
            section,
        } => {
            let proj = load_into(&service, &projection, None).await?;
            let history = service.section_history(&proj.id, &section).await?;
            write_json(&history, None)?;
        }
        Commands::Lock {
            projection,
            section,
            user,
            reason,
            output,
        } => {
            let proj = load_into(&service, &projection, None).await?;
            service.lock_section(&proj.id, &section, &user, &reason).await?;
            write_json(&service.get_projection(&proj.id).await?, output.as_deref())?;
        }
        Commands::Unlock {
            projection,
            section,
            output,
        } => {
            let proj = load_into(&service, &projection, None).await?;
            service.unlock_section(&proj.id, &section).await?;
            write_json(&service.get_projection(&proj.id).await?, output.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_content(path: &Path) -> Result<Vec<ContentItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read content file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid content file: {}", path.display()))
}

async fn ingest(service: &ProjectionService, items: Vec<ContentItem>) -> Result<()> {
    for item in items {
        service.add_content(item).await?;
    }
    Ok(())
}

/// Load a projection file (and optionally content) into the service.
///
/// Content is ingested before the projection is imported, so loading never
/// triggers an auto update.
async fn load_into(
    service: &ProjectionService,
    projection: &Path,
    content: Option<&Path>,
) -> Result<DocumentProjection> {
    let raw = std::fs::read_to_string(projection)
        .with_context(|| format!("Failed to read projection file: {}", projection.display()))?;
    let proj: DocumentProjection = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid projection file: {}", projection.display()))?;
    proj.config.validate()?;
    if let Some(content) = content {
        ingest(service, read_content(content)?).await?;
    }
    service.import_projection(&proj).await?;
    Ok(proj)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
