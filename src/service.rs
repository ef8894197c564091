//! Request-level API over the lineage core.
//!
//! Provides the three operations callers use: chat against an alias,
//! submit feedback on an answer, and list base models.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::config::{LineageConfig, StoreBackend};
use crate::defaults;
use crate::engine::{
    Generation, InferenceJob, JobAdapter, SamplingParams, ScriptJobAdapter, TrainingJob,
};
use crate::error::{Error, Result};
use crate::lineage::{
    FileLineageStore, LineageRecord, LineageStore, MemoryLineageStore, StoreError,
};
use crate::model::{validate_alias, AliasResolver};
use crate::promotion::{Feedback, FeedbackOutcome, Promotion, PromotionCoordinator, RejectReason};

const CHAT_ID_PREFIX: &str = "chatcmpl-";

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn generate_id(prefix: &str) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(22)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, random)
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Chat completion request addressed to an alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Alias to answer with
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// System and user prompt for a single-turn generation.
    fn prompts(&self, default_system: &str) -> Result<(String, String)> {
        let last = self
            .messages
            .last()
            .ok_or_else(|| Error::InvalidRequest("messages must not be empty".into()))?;
        if last.role != Role::User {
            return Err(Error::InvalidRequest("last message must be from user".into()));
        }

        let system = self
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| default_system.to_string());

        Ok((system, last.content.clone()))
    }

    fn sampling_params(&self) -> Result<SamplingParams> {
        let params = SamplingParams {
            max_tokens: self.max_tokens.unwrap_or(defaults::MAX_TOKENS),
            temperature: self.temperature.unwrap_or(defaults::TEMPERATURE),
        };
        if params.max_tokens <= 0 {
            return Err(Error::InvalidRequest("max_tokens must be positive".into()));
        }
        if !params.temperature.is_finite() || params.temperature < 0.0 {
            return Err(Error::InvalidRequest("temperature must be non-negative".into()));
        }
        Ok(params)
    }
}

/// What a caller needs to run inference and attribute later feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAlias {
    pub alias: String,
    pub base_model: String,
    /// Weights reference to pass to the inference engine
    pub weights: String,
    /// Lineage version the weights belong to
    pub version: u64,
}

impl From<&LineageRecord> for ResolvedAlias {
    fn from(record: &LineageRecord) -> Self {
        Self {
            alias: record.alias.clone(),
            base_model: record.base_model.clone(),
            weights: record.head_weights.clone(),
            version: record.version,
        }
    }
}

/// Answer to a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: String,
    pub created: i64,
    #[serde(flatten)]
    pub lineage: ResolvedAlias,
    #[serde(flatten)]
    pub generation: Generation,
}

/// Feedback on an answer produced by an alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(alias = "model_alias")]
    pub alias: String,
    #[serde(flatten)]
    pub feedback: Feedback,
    /// System prompt the answer was produced under
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Lineage version the answer came from; pins the promotion to it
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl FeedbackRequest {
    pub fn new(alias: impl Into<String>, feedback: Feedback) -> Self {
        Self {
            alias: alias.into(),
            feedback,
            system_prompt: None,
            expected_version: None,
        }
    }
}

/// Confirmation that feedback reached the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub record: LineageRecord,
    pub previous_version: u64,
    /// Training metrics as reported by the engine
    pub metrics: serde_json::Value,
}

/// Alias resolution, inference and feedback-driven promotion.
pub struct LineageService {
    resolver: AliasResolver,
    coordinator: PromotionCoordinator,
    adapter: Arc<dyn JobAdapter>,
    system_prompt: String,
    explain_corrections: bool,
    rebase_on_conflict: bool,
}

impl LineageService {
    /// Wire a service around an existing store and adapter.
    pub fn new(
        store: Arc<dyn LineageStore>,
        adapter: Arc<dyn JobAdapter>,
        config: &LineageConfig,
    ) -> Self {
        Self {
            resolver: AliasResolver::new(Arc::clone(&store), Arc::new(config.catalog())),
            coordinator: PromotionCoordinator::new(store, config.promotion_policy()),
            adapter,
            system_prompt: config.system_prompt.clone(),
            explain_corrections: config.feedback.explain_corrections,
            rebase_on_conflict: config.promotion.rebase_on_conflict,
        }
    }

    /// Build the configured store and script adapter.
    pub fn from_config(config: &LineageConfig) -> Result<Self> {
        let store: Arc<dyn LineageStore> = match config.store.backend {
            StoreBackend::File => Arc::new(FileLineageStore::open(&config.store.path)?),
            StoreBackend::Memory => Arc::new(MemoryLineageStore::new()),
        };
        let adapter = ScriptJobAdapter::new(config.script_paths())
            .with_timeout(config.job_timeout())
            .with_base_model_flag(config.engine.pass_base_model);

        Ok(Self::new(store, Arc::new(adapter), config))
    }

    /// Weights to use for `alias`, creating its lineage on first use.
    pub async fn resolve_for_inference(&self, alias: &str) -> Result<ResolvedAlias> {
        let record = self.resolver.resolve(alias).await?;
        Ok(ResolvedAlias::from(&record))
    }

    /// Stored lineage for `alias`, without creating one.
    pub async fn lookup(&self, alias: &str) -> Result<Option<LineageRecord>> {
        self.resolver.lookup(alias).await
    }

    /// Aliases with a stored lineage, sorted.
    pub async fn aliases(&self) -> Result<Vec<String>> {
        Ok(self.resolver.aliases().await?)
    }

    /// Answer the last user message with the alias's current head.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let (system_prompt, user_prompt) = request.prompts(&self.system_prompt)?;
        let params = request.sampling_params()?;
        let record = self.resolver.resolve(&request.model).await?;

        let generation = self
            .adapter
            .infer(InferenceJob {
                weights: record.head_weights.clone(),
                base_model: record.base_model.clone(),
                system_prompt,
                user_prompt,
                params,
            })
            .await?;

        Ok(ChatReply {
            id: generate_id(CHAT_ID_PREFIX),
            created: current_timestamp(),
            lineage: ResolvedAlias::from(&record),
            generation,
        })
    }

    /// Train on the feedback and advance the alias to the result.
    ///
    /// Malformed feedback and unknown aliases fail before any engine call.
    /// A training result that cannot be committed is reported as
    /// [`Error::PromotionConflict`] or [`Error::PromotionFailed`], never dropped.
    pub async fn submit_feedback(&self, request: FeedbackRequest) -> Result<FeedbackReceipt> {
        let alias = validate_alias(&request.alias)?;
        let feedback = &request.feedback;
        let completion = feedback.completion()?;

        let record = self
            .resolver
            .lookup(alias)
            .await?
            .ok_or_else(|| RejectReason::UnknownAlias(alias.to_string()))?;

        if let Some(expected) = request.expected_version {
            if record.version != expected {
                return Err(StoreError::VersionConflict {
                    alias: alias.to_string(),
                    expected,
                    actual: record.version,
                }
                .into());
            }
        }

        let system_prompt = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.system_prompt.clone());

        let completion = if feedback.outcome == FeedbackOutcome::Corrected && self.explain_corrections
        {
            self.explain_correction(&record, &feedback.prompt, completion, &system_prompt)
                .await?
        } else {
            completion.to_string()
        };

        let result = self
            .adapter
            .train(TrainingJob {
                base_model: record.base_model.clone(),
                resume_from: record.resume_checkpoint.clone(),
                system_prompt,
                prompt: feedback.prompt.clone(),
                completion,
                sampled: feedback.sampled_completion(),
            })
            .await?;

        let pinned = request
            .expected_version
            .or((!self.rebase_on_conflict).then_some(record.version));

        let promotion = match pinned {
            Some(version) => {
                self.coordinator
                    .promote_at(alias, feedback, &result, version)
                    .await
            }
            None => self.coordinator.promote(alias, feedback, &result).await,
        };

        match promotion {
            Ok(Promotion::Promoted {
                record,
                previous_version,
            }) => Ok(FeedbackReceipt {
                record,
                previous_version,
                metrics: result.metrics,
            }),
            Ok(Promotion::Conflict { attempts, .. }) => {
                Err(orphan(Error::PromotionConflict {
                    alias: alias.to_string(),
                    attempts,
                    orphaned: Box::new(result),
                }))
            }
            Ok(Promotion::Rejected(reason)) => {
                log::warn!("Promotion of '{}' rejected after training: {}", alias, reason);
                Err(orphan(Error::PromotionFailed {
                    alias: alias.to_string(),
                    orphaned: Box::new(result),
                    source: StoreError::NotFound(alias.to_string()),
                }))
            }
            Err(Error::Store(source)) => Err(orphan(Error::PromotionFailed {
                alias: alias.to_string(),
                orphaned: Box::new(result),
                source,
            })),
            Err(e) => Err(e),
        }
    }

    /// Base models offered for new aliases.
    pub fn list_base_models(&self) -> &[String] {
        self.resolver.catalog().base_models()
    }

    /// Ask the base model to reason its way to `correction`.
    async fn explain_correction(
        &self,
        record: &LineageRecord,
        prompt: &str,
        correction: &str,
        system_prompt: &str,
    ) -> Result<String> {
        let user_prompt = format!(
            "The user asked: {}. The correct answer is: {}. \
             Explain step-by-step, using Chain of Thought reasoning, how to arrive at this answer. \
             Do not output the final answer, only the reasoning steps.",
            prompt, correction
        );

        let reasoning = self
            .adapter
            .infer(InferenceJob {
                weights: record.base_model.clone(),
                base_model: record.base_model.clone(),
                system_prompt: system_prompt.to_string(),
                user_prompt,
                params: SamplingParams {
                    max_tokens: defaults::EXPLANATION_MAX_TOKENS,
                    temperature: defaults::TEMPERATURE,
                },
            })
            .await?;

        Ok(format!("{}\n\nAnswer: {}", reasoning.text.trim(), correction))
    }
}

/// Log a training result that no lineage references, for manual recovery.
fn orphan(err: Error) -> Error {
    if let Some(result) = err.orphaned_checkpoint() {
        log::error!(
            "Orphaned checkpoint: resume {} / weights {} ({})",
            result.resume_checkpoint,
            result.head_weights,
            err
        );
    }
    err
}
