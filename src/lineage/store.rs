//! Lineage store contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::lineage::record::LineageRecord;

/// Errors raised by a lineage store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No lineage for alias '{0}'")]
    NotFound(String),

    #[error("Lineage for alias '{0}' already exists")]
    AlreadyExists(String),

    #[error("Version conflict on '{alias}': expected {expected}, found {actual}")]
    VersionConflict {
        alias: String,
        expected: u64,
        actual: u64,
    },

    #[error("Field '{field}' of lineage '{alias}' is write-once")]
    Immutable { alias: String, field: &'static str },

    #[error("Corrupt lineage record for '{alias}': {detail}")]
    CorruptRecord { alias: String, detail: String },

    #[error("Lineage store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Infrastructure failures that a caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable alias -> lineage mapping with atomic create and versioned update.
///
/// Implementations must be safe for any number of concurrent callers and must
/// never hold a lock across more than a single create or swap.
#[async_trait]
pub trait LineageStore: Send + Sync {
    /// Most recently committed record for `alias`, if any.
    async fn get(&self, alias: &str) -> Result<Option<LineageRecord>>;

    /// Insert a new record. Exactly one of several racing creators succeeds;
    /// the others get [`StoreError::AlreadyExists`].
    async fn create(&self, record: LineageRecord) -> Result<()>;

    /// Replace the record for `alias` if its stored version is `expected_version`.
    ///
    /// The committed record carries `version = expected_version + 1` regardless
    /// of the version on `next`. Returns the committed record.
    async fn compare_and_swap(
        &self,
        alias: &str,
        expected_version: u64,
        next: LineageRecord,
    ) -> Result<LineageRecord>;

    /// Every stored alias, sorted.
    async fn aliases(&self) -> Result<Vec<String>>;
}

/// Checks shared by every store before a swap is committed.
pub(crate) fn check_swap(
    current: &LineageRecord,
    expected_version: u64,
    next: &LineageRecord,
) -> Result<()> {
    if current.version != expected_version {
        return Err(StoreError::VersionConflict {
            alias: current.alias.clone(),
            expected: expected_version,
            actual: current.version,
        });
    }
    if next.alias != current.alias {
        return Err(StoreError::Immutable {
            alias: current.alias.clone(),
            field: "alias",
        });
    }
    if next.base_model != current.base_model {
        return Err(StoreError::Immutable {
            alias: current.alias.clone(),
            field: "baseModel",
        });
    }
    Ok(())
}
