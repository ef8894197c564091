//! Configuration for the lineage service.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `LINEAGE_`, using `__` between
//!    section and key (e.g. `LINEAGE_STORE__PATH`, `LINEAGE_PROMOTION__MAX_ATTEMPTS`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::Config;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::engine::ScriptPaths;
use crate::error::Result;
use crate::model::BaseModelCatalog;
use crate::promotion::PromotionPolicy;

pub const ENV_PREFIX: &str = "LINEAGE";

/// Where lineage records live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON document per alias on disk
    #[default]
    File,
    /// Process-local, lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Base model for aliases no family claims
    #[serde(default = "defaults::default_base_model")]
    pub default_base_model: String,
    /// Organization prefixes recognized as base model families
    #[serde(default = "defaults::base_model_families")]
    pub families: Vec<String>,
    /// Base models offered for selection
    #[serde(default = "defaults::base_models")]
    pub base_models: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            default_base_model: defaults::default_base_model(),
            families: defaults::base_model_families(),
            base_models: defaults::base_models(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,
    #[serde(default = "defaults::inference_script")]
    pub inference_script: PathBuf,
    #[serde(default = "defaults::training_script")]
    pub training_script: PathBuf,
    /// Per-job limit; unset means wait indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Pass `--base_model` to the inference script
    #[serde(default)]
    pub pass_base_model: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            inference_script: defaults::inference_script(),
            training_script: defaults::training_script(),
            timeout_secs: None,
            pass_base_model: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionSettings {
    #[serde(default = "defaults::max_promotion_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::promotion_backoff_ms")]
    pub backoff_ms: u64,
    /// Commit a result even if the lineage advanced while it was training
    #[serde(default = "defaults::rebase_on_conflict")]
    pub rebase_on_conflict: bool,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_PROMOTION_ATTEMPTS,
            backoff_ms: defaults::PROMOTION_BACKOFF_MS,
            rebase_on_conflict: defaults::rebase_on_conflict(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSettings {
    /// Train corrections on base-model reasoning followed by the answer
    #[serde(default)]
    pub explain_corrections: bool,
}

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub promotion: PromotionSettings,
    #[serde(default)]
    pub feedback: FeedbackSettings,
    /// System prompt used when a request carries none
    #[serde(default = "defaults::system_prompt")]
    pub system_prompt: String,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            catalog: CatalogSettings::default(),
            engine: EngineSettings::default(),
            promotion: PromotionSettings::default(),
            feedback: FeedbackSettings::default(),
            system_prompt: defaults::system_prompt(),
        }
    }
}

impl LineageConfig {
    /// Load from defaults, an optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn catalog(&self) -> BaseModelCatalog {
        BaseModelCatalog::new(
            self.catalog.families.clone(),
            self.catalog.base_models.clone(),
            self.catalog.default_base_model.clone(),
        )
    }

    pub fn promotion_policy(&self) -> PromotionPolicy {
        PromotionPolicy {
            max_attempts: self.promotion.max_attempts,
            backoff: Duration::from_millis(self.promotion.backoff_ms),
        }
    }

    pub fn script_paths(&self) -> ScriptPaths {
        ScriptPaths {
            interpreter: self.engine.interpreter.clone(),
            inference_script: self.engine.inference_script.clone(),
            training_script: self.engine.training_script.clone(),
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.engine.timeout_secs.map(Duration::from_secs)
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("alias-lineage")
        .join("lineages")
}

fn default_interpreter() -> PathBuf {
    defaults::interpreter().into()
}
