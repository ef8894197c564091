//! The per-alias lineage record.

use serde::{Deserialize, Serialize};

use crate::engine::TrainingResult;

/// Durable state of one alias.
///
/// `alias` and `base_model` are fixed at creation. Only the head, the resume
/// checkpoint and the version move, and only through a compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRecord {
    /// Human-assigned key
    pub alias: String,
    /// Root model family this alias descends from
    pub base_model: String,
    /// Weights reference used for inference
    pub head_weights: String,
    /// Checkpoint the next training step resumes from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_checkpoint: Option<String>,
    /// Compare-and-swap token, bumped once per promotion
    pub version: u64,
}

impl LineageRecord {
    /// A fresh lineage sampling directly from its base model.
    pub fn rooted(alias: impl Into<String>, base_model: impl Into<String>) -> Self {
        let base_model = base_model.into();
        Self {
            alias: alias.into(),
            head_weights: base_model.clone(),
            base_model,
            resume_checkpoint: None,
            version: 0,
        }
    }

    /// Where the next training job should resume from.
    pub fn resume_point(&self) -> &str {
        self.resume_checkpoint.as_deref().unwrap_or(&self.base_model)
    }

    /// Whether training has never been committed to this lineage.
    pub fn is_pristine(&self) -> bool {
        self.resume_checkpoint.is_none()
    }

    /// The record that results from committing `result` on top of this one.
    ///
    /// Head and resume checkpoint are replaced wholesale, never merged.
    pub fn advanced(&self, result: &TrainingResult) -> Self {
        Self {
            alias: self.alias.clone(),
            base_model: self.base_model.clone(),
            head_weights: result.head_weights.clone(),
            resume_checkpoint: Some(result.resume_checkpoint.clone()),
            version: self.version + 1,
        }
    }
}
