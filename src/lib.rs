//! # Memoir Projections
//!
//! A document projection engine for collaborative life-story content.
//!
//! Contributors add memories (answers, notes, media descriptions) to a
//! project's content pool. A *projection* is a named document computed
//! from that pool: sections are synthesized from the content, can be
//! locked once a person approves them, and are brought up to date with one
//! of four update modes as new content arrives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │ ContentStore │──▶│    Engine     │──▶│ ProjectionStore│
//! │  pool+items  │   │ strategies +  │   │  projections   │
//! └──────────────┘   │  synthesizer  │   └────────────────┘
//!                    └───────┬───────┘
//!                            ▼
//!                    ┌───────────────┐
//!                    │    Service    │◀── CLI (memoir)
//!                    └───────────────┘
//! ```
//!
//! Domain types (pool, context, sections, projections, the synthesis
//! contract, store traits) live in `memoir-projections-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`synthesis`] | Disabled and OpenAI-compatible synthesizers |
//! | [`strategy`] | Update-mode strategies and synthesis jobs |
//! | [`engine`] | Generation and update passes |
//! | [`service`] | Store-backed surface with per-projection serialization |

pub mod config;
pub mod engine;
pub mod service;
pub mod strategy;
pub mod synthesis;

