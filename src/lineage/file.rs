//! Filesystem-backed lineage store.
//!
//! Layout: `<root>/<hex(alias)>.json`, with a sibling `<hex(alias)>.lock` that
//! serializes create and swap across threads and processes. Records are
//! replaced by temp file + rename, so lock-free readers see either the old or
//! the new document, never a partial one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::fs_std::FileExt;

use crate::lineage::record::LineageRecord;
use crate::lineage::store::{check_swap, LineageStore, Result, StoreError};

const RECORD_EXTENSION: &str = "json";

/// Durable store with one JSON document per alias.
#[derive(Debug, Clone)]
pub struct FileLineageStore {
    root: PathBuf,
}

impl FileLineageStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(&root))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn record_path(root: &Path, alias: &str) -> PathBuf {
    root.join(format!("{}.{}", hex::encode(alias), RECORD_EXTENSION))
}

fn lock_path(root: &Path, alias: &str) -> PathBuf {
    root.join(format!("{}.lock", hex::encode(alias)))
}

fn lock_alias(root: &Path, alias: &str) -> Result<File> {
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(root, alias))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| StoreError::Unavailable(format!("failed to lock '{}': {}", alias, e)))?;
    Ok(lock_file)
}

fn read_record(root: &Path, alias: &str) -> Result<Option<LineageRecord>> {
    let content = match fs::read_to_string(record_path(root, alias)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let record: LineageRecord =
        serde_json::from_str(&content).map_err(|e| StoreError::CorruptRecord {
            alias: alias.to_string(),
            detail: e.to_string(),
        })?;

    if record.alias != alias {
        return Err(StoreError::CorruptRecord {
            alias: alias.to_string(),
            detail: format!("stored record belongs to '{}'", record.alias),
        });
    }

    Ok(Some(record))
}

fn write_record(root: &Path, record: &LineageRecord) -> Result<()> {
    let path = record_path(root, &record.alias);
    let tmp_path = path.with_extension("tmp");

    let body = serde_json::to_vec_pretty(record)
        .map_err(|e| StoreError::Unavailable(format!("failed to encode record: {}", e)))?;

    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(&body)?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, &path)?;
    sync_dir(root)
}

/// Flush the directory entry so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl LineageStore for FileLineageStore {
    async fn get(&self, alias: &str) -> Result<Option<LineageRecord>> {
        let alias = alias.to_string();
        self.blocking(move |root| read_record(root, &alias)).await
    }

    async fn create(&self, record: LineageRecord) -> Result<()> {
        self.blocking(move |root| {
            let lock = lock_alias(root, &record.alias)?;

            if record_path(root, &record.alias).exists() {
                return Err(StoreError::AlreadyExists(record.alias));
            }
            write_record(root, &record)?;

            drop(lock);
            Ok(())
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        alias: &str,
        expected_version: u64,
        mut next: LineageRecord,
    ) -> Result<LineageRecord> {
        let alias = alias.to_string();
        self.blocking(move |root| {
            let lock = lock_alias(root, &alias)?;

            let current =
                read_record(root, &alias)?.ok_or_else(|| StoreError::NotFound(alias.clone()))?;
            check_swap(&current, expected_version, &next)?;

            next.version = expected_version + 1;
            write_record(root, &next)?;

            drop(lock);
            Ok(next)
        })
        .await
    }

    async fn aliases(&self) -> Result<Vec<String>> {
        self.blocking(|root| {
            let mut aliases = Vec::new();
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) {
                    Some(alias) => aliases.push(alias),
                    None => log::warn!("Ignoring unrecognized file in lineage store: {:?}", path),
                }
            }
            aliases.sort();
            Ok(aliases)
        })
        .await
    }
}
