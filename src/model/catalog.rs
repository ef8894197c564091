//! Base model catalog.
//!
//! Decides which base model an unseen alias descends from. Pure and
//! stateless; the family and model lists come from configuration.

use crate::defaults;

/// Recognized base models and families plus the fallback for everything else.
#[derive(Debug, Clone)]
pub struct BaseModelCatalog {
    families: Vec<String>,
    base_models: Vec<String>,
    default_base_model: String,
}

impl BaseModelCatalog {
    pub fn new(
        families: Vec<String>,
        base_models: Vec<String>,
        default_base_model: impl Into<String>,
    ) -> Self {
        Self {
            families,
            base_models,
            default_base_model: default_base_model.into(),
        }
    }

    /// Base model an alias should be rooted at.
    ///
    /// In order of preference:
    /// 1. the alias itself, when it names a listed base model
    /// 2. the longest listed base model the alias extends with `/...`
    /// 3. `org/model` when `org` is a recognized family
    /// 4. the configured default
    pub fn classify(&self, alias: &str) -> String {
        if self.base_models.iter().any(|m| m == alias) {
            return alias.to_string();
        }

        let extended = self
            .base_models
            .iter()
            .filter(|m| {
                alias
                    .strip_prefix(m.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|m| m.len());
        if let Some(model) = extended {
            return model.clone();
        }

        let mut segments = alias.splitn(3, '/');
        if let (Some(org), Some(model)) = (segments.next(), segments.next()) {
            if !model.is_empty() && self.families.iter().any(|f| f == org) {
                return format!("{}/{}", org, model);
            }
        }

        self.default_base_model.clone()
    }

    /// Listed base models, for populating model pickers.
    pub fn base_models(&self) -> &[String] {
        &self.base_models
    }
}

impl Default for BaseModelCatalog {
    fn default() -> Self {
        Self::new(
            defaults::base_model_families(),
            defaults::base_models(),
            defaults::DEFAULT_BASE_MODEL,
        )
    }
}
