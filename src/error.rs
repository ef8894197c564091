//! Error types for alias lineages.

use thiserror::Error;

use crate::engine::{EngineError, TrainingResult};
use crate::lineage::StoreError;
use crate::promotion::RejectReason;

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Alias was empty after trimming
    #[error("Alias must not be empty")]
    EmptyAlias,

    /// Request failed validation before any work was done
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Lineage store error
    #[error("Lineage store error: {0}")]
    Store(#[from] StoreError),

    /// External inference or training job failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Feedback could not be applied and nothing was trained
    #[error("Feedback rejected: {0}")]
    FeedbackRejected(#[from] RejectReason),

    /// Training succeeded but the lineage kept moving
    #[error(
        "Promotion of '{alias}' lost to concurrent updates after {attempts} attempts; checkpoint {} (weights {}) was not applied",
        .orphaned.resume_checkpoint,
        .orphaned.head_weights
    )]
    PromotionConflict {
        alias: String,
        attempts: u32,
        orphaned: Box<TrainingResult>,
    },

    /// Training succeeded but the store failed while committing
    #[error(
        "Promotion of '{alias}' failed: {source}; checkpoint {} (weights {}) was not applied",
        .orphaned.resume_checkpoint,
        .orphaned.head_weights
    )]
    PromotionFailed {
        alias: String,
        orphaned: Box<TrainingResult>,
        #[source]
        source: StoreError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Training output that exists but is not referenced by any lineage.
    pub fn orphaned_checkpoint(&self) -> Option<&TrainingResult> {
        match self {
            Self::PromotionConflict { orphaned, .. } | Self::PromotionFailed { orphaned, .. } => {
                Some(&**orphaned)
            }
            _ => None,
        }
    }

    /// True when no checkpoint was produced, so the whole request can be
    /// repeated without losing work.
    pub fn model_unchanged(&self) -> bool {
        self.orphaned_checkpoint().is_none()
    }

    /// Infrastructure failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::PromotionFailed { source: e, .. } => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for lineage operations.
pub type Result<T> = std::result::Result<T, Error>;
