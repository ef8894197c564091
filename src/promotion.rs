//! Feedback-driven promotion of lineage heads.
//!
//! A promotion commits a training result that the engine has already
//! produced. It never decides whether training succeeded, and it never
//! overwrites a head that moved underneath it: every commit is a
//! compare-and-swap against the version that was read.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults;
use crate::engine::{SampledCompletion, TrainingResult};
use crate::error::Result;
use crate::lineage::{LineageRecord, LineageStore, StoreError};

/// Reviewer verdict on a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackOutcome {
    /// The generated output should be reinforced
    #[serde(alias = "positive")]
    Approved,
    /// The generated output is replaced by a correction
    #[serde(alias = "negative")]
    Corrected,
}

/// One round of feedback on a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub prompt: String,
    #[serde(rename = "feedback_type")]
    pub outcome: FeedbackOutcome,
    /// The answer the model produced
    #[serde(default)]
    pub generated_output: Option<String>,
    /// The reviewer's replacement answer
    #[serde(default)]
    pub correct_output: Option<String>,
    /// Token ids of the answer as it was served
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<i64>>,
    /// Sampling log probabilities of `tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<f64>>,
}

impl Feedback {
    pub fn approved(prompt: impl Into<String>, generated: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            outcome: FeedbackOutcome::Approved,
            generated_output: Some(generated.into()),
            correct_output: None,
            tokens: None,
            logprobs: None,
        }
    }

    pub fn corrected(prompt: impl Into<String>, correction: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            outcome: FeedbackOutcome::Corrected,
            generated_output: None,
            correct_output: Some(correction.into()),
            tokens: None,
            logprobs: None,
        }
    }

    /// Attach the served tokens and log probabilities of the answer.
    pub fn with_sample(mut self, tokens: Vec<i64>, logprobs: Vec<f64>) -> Self {
        self.tokens = Some(tokens);
        self.logprobs = Some(logprobs);
        self
    }

    /// The served answer as a training sample, when both tokens and log
    /// probabilities came with the feedback. Approval reinforces it, a
    /// correction pushes away from it.
    pub fn sampled_completion(&self) -> Option<SampledCompletion> {
        match (&self.tokens, &self.logprobs) {
            (Some(tokens), Some(logprobs)) if !tokens.is_empty() && !logprobs.is_empty() => {
                Some(SampledCompletion {
                    tokens: tokens.clone(),
                    logprobs: logprobs.clone(),
                    advantage: match self.outcome {
                        FeedbackOutcome::Approved => 1.0,
                        FeedbackOutcome::Corrected => -1.0,
                    },
                })
            }
            _ => None,
        }
    }

    /// The completion training should reinforce.
    pub fn completion(&self) -> std::result::Result<&str, RejectReason> {
        if self.prompt.trim().is_empty() {
            return Err(RejectReason::MissingPrompt);
        }
        let (text, missing) = match self.outcome {
            FeedbackOutcome::Approved => {
                (self.generated_output.as_deref(), RejectReason::MissingGeneratedOutput)
            }
            FeedbackOutcome::Corrected => {
                (self.correct_output.as_deref(), RejectReason::MissingCorrection)
            }
        };
        text.filter(|t| !t.trim().is_empty()).ok_or(missing)
    }
}

/// Why feedback was not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("corrected feedback requires a correct_output")]
    MissingCorrection,

    #[error("approved feedback requires the generated_output")]
    MissingGeneratedOutput,

    #[error("feedback requires the original prompt")]
    MissingPrompt,

    #[error("alias '{0}' has never been resolved")]
    UnknownAlias(String),
}

/// Result of a promotion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// The head advanced; `record` is what was committed
    Promoted {
        record: LineageRecord,
        previous_version: u64,
    },
    /// The lineage kept moving; the training result was not committed
    Conflict { attempts: u32, latest_version: u64 },
    /// Nothing was attempted
    Rejected(RejectReason),
}

/// Retry bounds for racing promotions.
#[derive(Debug, Clone, Copy)]
pub struct PromotionPolicy {
    /// Swaps tried before reporting a conflict (at least one)
    pub max_attempts: u32,
    /// Base delay between attempts; each wait adds up to the same again as jitter
    pub backoff: Duration,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_PROMOTION_ATTEMPTS,
            backoff: Duration::from_millis(defaults::PROMOTION_BACKOFF_MS),
        }
    }
}

/// Commits training results to lineage heads.
#[derive(Clone)]
pub struct PromotionCoordinator {
    store: Arc<dyn LineageStore>,
    policy: PromotionPolicy,
}

impl PromotionCoordinator {
    pub fn new(store: Arc<dyn LineageStore>, policy: PromotionPolicy) -> Self {
        Self { store, policy }
    }

    /// Advance `alias` to `result`, re-reading and retrying on version conflicts.
    ///
    /// Malformed feedback is rejected before the store is touched.
    pub async fn promote(
        &self,
        alias: &str,
        feedback: &Feedback,
        result: &TrainingResult,
    ) -> Result<Promotion> {
        if let Err(reason) = feedback.completion() {
            return Ok(Promotion::Rejected(reason));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let Some(current) = self.store.get(alias).await? else {
                return Ok(Promotion::Rejected(RejectReason::UnknownAlias(alias.to_string())));
            };

            match self.swap(&current, result).await? {
                Ok(promotion) => return Ok(promotion),
                Err(latest_version) if attempts >= max_attempts => {
                    log::warn!(
                        "Giving up promoting '{}' after {} attempts (lineage at v{})",
                        alias,
                        attempts,
                        latest_version
                    );
                    return Ok(Promotion::Conflict {
                        attempts,
                        latest_version,
                    });
                }
                Err(latest_version) => {
                    log::warn!(
                        "Lineage '{}' moved to v{} during promotion; retrying ({}/{})",
                        alias,
                        latest_version,
                        attempts,
                        max_attempts
                    );
                    tokio::time::sleep(self.backoff(attempts)).await;
                }
            }
        }
    }

    /// Advance `alias` to `result` only if it is still at `expected_version`.
    ///
    /// For results trained against a specific lineage point; a lineage that
    /// has moved on is reported as a conflict without retrying.
    pub async fn promote_at(
        &self,
        alias: &str,
        feedback: &Feedback,
        result: &TrainingResult,
        expected_version: u64,
    ) -> Result<Promotion> {
        if let Err(reason) = feedback.completion() {
            return Ok(Promotion::Rejected(reason));
        }

        let Some(current) = self.store.get(alias).await? else {
            return Ok(Promotion::Rejected(RejectReason::UnknownAlias(alias.to_string())));
        };

        if current.version != expected_version {
            log::warn!(
                "Stale promotion for '{}': trained against v{}, lineage at v{}",
                alias,
                expected_version,
                current.version
            );
            return Ok(Promotion::Conflict {
                attempts: 1,
                latest_version: current.version,
            });
        }

        Ok(match self.swap(&current, result).await? {
            Ok(promotion) => promotion,
            Err(latest_version) => Promotion::Conflict {
                attempts: 1,
                latest_version,
            },
        })
    }

    /// One compare-and-swap. The inner `Err` is the version that won instead.
    async fn swap(
        &self,
        current: &LineageRecord,
        result: &TrainingResult,
    ) -> Result<std::result::Result<Promotion, u64>> {
        let next = current.advanced(result);
        match self
            .store
            .compare_and_swap(&current.alias, current.version, next)
            .await
        {
            Ok(record) => {
                log::info!(
                    "Promoted '{}' to v{}: head {}",
                    record.alias,
                    record.version,
                    record.head_weights
                );
                Ok(Ok(Promotion::Promoted {
                    record,
                    previous_version: current.version,
                }))
            }
            Err(StoreError::VersionConflict { actual, .. }) => Ok(Err(actual)),
            Err(StoreError::NotFound(alias)) => {
                Ok(Ok(Promotion::Rejected(RejectReason::UnknownAlias(alias))))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff.as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=base);
        Duration::from_millis(base * attempt as u64 + jitter)
    }
}
