//! # Memoir Projections Core
//!
//! Runtime-free domain logic for document projections: content pool,
//! narrative context, projected sections with bounded version history,
//! document projections, the synthesis contract with its deterministic
//! fallbacks, and the store abstraction.
//!
//! Documents are *projections*: computed, regenerable views over the
//! collected content. The content is the source of truth; sections can be
//! locked so automated updates never overwrite human-approved prose.
//!
//! This crate contains no tokio, network, or filesystem dependencies.

pub mod context;
pub mod error;
pub mod history;
pub mod models;
pub mod pool;
pub mod projection;
pub mod section;
pub mod store;
pub mod synthesis;

pub use error::{ProjectionError, ProjectionResult};
