//! Error taxonomy for projection operations.
//!
//! Synthesis failures are not part of the public failure surface: the
//! engine recovers from them with deterministic fallback content. The
//! [`ProjectionError::Synthesis`] variant exists so providers and logs can
//! describe the failure uniformly.

use std::fmt;

use crate::section::SectionState;

pub type ProjectionResult<T> = std::result::Result<T, ProjectionError>;

/// What kind of entity a [`ProjectionError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Projection,
    Section,
    Project,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Projection => write!(f, "projection"),
            EntityKind::Section => write!(f, "section"),
            EntityKind::Project => write!(f, "project"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("section {section_id} has no version {version} in its history")]
    VersionNotFound { section_id: String, version: u32 },

    #[error("cannot {action} section {section_id} in state {from}")]
    InvalidTransition {
        section_id: String,
        from: SectionState,
        action: &'static str,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("synthesis unavailable: {0}")]
    Synthesis(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ProjectionError {
    pub fn projection_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: EntityKind::Projection,
            id: id.into(),
        }
    }

    pub fn section_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: EntityKind::Section,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProjectionError::NotFound { .. } | ProjectionError::VersionNotFound { .. }
        )
    }
}
