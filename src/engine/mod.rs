//! Job invocation for the external inference and training engines.
//!
//! This module provides:
//! - The `JobAdapter` contract and the job/result types it carries
//! - A child-process implementation driving the engine scripts (`script`)
//!
//! Adapters hold no lineage state and never retry; callers decide policy.

pub mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults;

pub use script::{ScriptJobAdapter, ScriptPaths};

/// Failures of an external job, carrying the engine's own detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Training failed: {0}")]
    TrainingFailed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Sampling parameters for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "defaults::max_tokens")]
    pub max_tokens: i32,
    #[serde(default = "defaults::temperature")]
    pub temperature: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
        }
    }
}

/// A single generation request against resolved weights.
#[derive(Debug, Clone)]
pub struct InferenceJob {
    /// Weights reference to sample from
    pub weights: String,
    /// Root model family, for tokenizer and template selection
    pub base_model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub params: SamplingParams,
}

/// Output of an inference job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text
    #[serde(alias = "content")]
    pub text: String,
    /// Sampled token ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<i64>>,
    /// Per-token log probabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<f64>>,
}

/// A single supervised step extending a lineage.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub base_model: String,
    /// Checkpoint to resume from; `None` starts from the base model
    pub resume_from: Option<String>,
    pub system_prompt: String,
    pub prompt: String,
    /// Completion to reinforce
    pub completion: String,
    /// The answer as served, for importance-sampled training
    pub sampled: Option<SampledCompletion>,
}

/// Served tokens of an answer with their sampling log probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledCompletion {
    pub tokens: Vec<i64>,
    pub logprobs: Vec<f64>,
    /// +1 reinforces the sample, -1 pushes away from it
    pub advantage: f64,
}

/// Checkpoints produced by a successful training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Checkpoint the next job should resume from
    #[serde(alias = "resume_path")]
    pub resume_checkpoint: String,
    /// Sampling-ready weights for the new head
    #[serde(alias = "sampling_path")]
    pub head_weights: String,
    /// Engine metrics, passed through untouched
    #[serde(default)]
    pub metrics: serde_json::Value,
}

/// Synchronous request/response façade over the external engines.
///
/// Both calls may run for minutes. Dropping the returned future cancels the
/// job; implementations must not leave it running.
#[async_trait]
pub trait JobAdapter: Send + Sync {
    async fn infer(&self, job: InferenceJob) -> Result<Generation>;

    async fn train(&self, job: TrainingJob) -> Result<TrainingResult>;
}
