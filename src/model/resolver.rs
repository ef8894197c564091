//! Alias resolution.

use std::sync::Arc;

use crate::defaults;
use crate::error::{Error, Result};
use crate::lineage::{LineageRecord, LineageStore, StoreError};
use crate::model::catalog::BaseModelCatalog;

/// Normalize a requested alias, rejecting ones no store can key on.
pub fn validate_alias(requested: &str) -> Result<&str> {
    let alias = requested.trim();
    if alias.is_empty() {
        return Err(Error::EmptyAlias);
    }
    if alias.len() > defaults::MAX_ALIAS_BYTES {
        return Err(Error::InvalidRequest(format!(
            "alias is {} bytes, limit is {}",
            alias.len(),
            defaults::MAX_ALIAS_BYTES
        )));
    }
    Ok(alias)
}

/// Resolves aliases to lineage records, creating lineages on first use.
#[derive(Clone)]
pub struct AliasResolver {
    store: Arc<dyn LineageStore>,
    catalog: Arc<BaseModelCatalog>,
}

impl AliasResolver {
    pub fn new(store: Arc<dyn LineageStore>, catalog: Arc<BaseModelCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Record to use for inference on `requested_alias`.
    ///
    /// An unseen alias is rooted at the base model the catalog picks for it.
    /// When several callers race on first use, exactly one record is created
    /// and every caller gets that record back.
    pub async fn resolve(&self, requested_alias: &str) -> Result<LineageRecord> {
        let alias = validate_alias(requested_alias)?;

        if let Some(record) = self.store.get(alias).await? {
            log::debug!("Alias '{}' resolved to {} (v{})", alias, record.head_weights, record.version);
            return Ok(record);
        }

        let base_model = self.catalog.classify(alias);
        let record = LineageRecord::rooted(alias, base_model);

        match self.store.create(record.clone()).await {
            Ok(()) => {
                log::info!("Created lineage '{}' rooted at {}", alias, record.base_model);
                Ok(record)
            }
            Err(StoreError::AlreadyExists(_)) => {
                log::debug!("Lost creation race for '{}'; using stored lineage", alias);
                self.store
                    .get(alias)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(alias.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored record for `requested_alias` without creating one.
    pub async fn lookup(&self, requested_alias: &str) -> Result<Option<LineageRecord>> {
        let alias = validate_alias(requested_alias)?;
        Ok(self.store.get(alias).await?)
    }

    pub async fn aliases(&self) -> Result<Vec<String>> {
        Ok(self.store.aliases().await?)
    }

    pub fn catalog(&self) -> &BaseModelCatalog {
        &self.catalog
    }
}
