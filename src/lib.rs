//! Alias Lineage - named model aliases that improve from reviewer feedback.
//!
//! Every alias owns a lineage: the base model it was rooted on, the weights
//! currently served, and the checkpoint the next training job resumes from.
//! Feedback trains a new checkpoint and promotes it to the head with a
//! compare-and-swap, so concurrent promotions never overwrite each other.

pub mod config;
mod defaults;
pub mod engine;
pub mod error;
pub mod lineage;
pub mod model;
pub mod promotion;
pub mod service;

pub use error::{Error, Result};

pub use crate::config::{LineageConfig, StoreBackend};

pub use lineage::{FileLineageStore, LineageRecord, LineageStore, MemoryLineageStore, StoreError};

pub use model::{validate_alias, AliasResolver, BaseModelCatalog};

pub use engine::{
    EngineError, Generation, InferenceJob, JobAdapter, SampledCompletion, SamplingParams,
    ScriptJobAdapter, ScriptPaths, TrainingJob, TrainingResult,
};

pub use promotion::{
    Feedback, FeedbackOutcome, Promotion, PromotionCoordinator, PromotionPolicy, RejectReason,
};

pub use service::{
    ChatMessage, ChatReply, ChatRequest, FeedbackReceipt, FeedbackRequest, LineageService,
    ResolvedAlias, Role,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
