//! On-disk cache for map and filter results.
//!
//! Entries are JSON files named by a SHA-256 fingerprint of the transform
//! identity and the input rows, so a change to either produces a new key.

use dsproc_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hex-encoded SHA-256 of `bytes`.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Directory of cached transform results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformCache {
    dir: PathBuf,
}

impl TransformCache {
    /// Use `dir` for cache entries. Created on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key for applying `transform` to `input`.
    pub fn key<T: Serialize + ?Sized>(&self, transform: &str, input: &T) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(transform.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(input)?);
        Ok(hex::encode(hasher.finalize()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Read a cached value, `None` on a miss.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.entry_path(key);
        if !path.exists() {
            debug!(key, "transform cache miss");
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        debug!(key, "transform cache hit");
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Persist a value under `key`.
    pub fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
