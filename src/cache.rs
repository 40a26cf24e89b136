//! On-disk persistence of paired trees and search progress
//!
//! One file per (version, old version, test case) at
//! `<root>/<version>/<Class#method>/<version_old>.json`. The file is an
//! envelope around the JSON payload carrying a format version and the
//! SHA-256 of the payload, so a truncated or hand-edited file is reported as
//! corrupt instead of being resumed from. Writes go to a temporary file that
//! is renamed over the target.

use crate::call_tree::{CallTreePair, NodeId};
use crate::config::TestCase;
use crate::error::{CauseSearchError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Version of the envelope and payload layout
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Identity of one search
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub version: String,
    pub version_old: String,
    pub test_case: TestCase,
}

impl CacheKey {
    pub fn new(version: impl Into<String>, version_old: impl Into<String>, test_case: TestCase) -> Self {
        Self {
            version: version.into(),
            version_old: version_old.into(),
            test_case,
        }
    }
}

/// Where a search stands after its last completed measure+compare cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Starts of the next frontier to measure
    pub frontier_starts: Vec<NodeId>,

    /// Every pair compared as different so far
    pub differing: BTreeSet<NodeId>,

    pub frontiers_measured: usize,

    pub finished: bool,

    /// Cause set; only meaningful once `finished` is set
    pub causes: BTreeSet<String>,
}

/// Paired trees with all accumulated measurements plus search progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub pair: CallTreePair,
    pub progress: SearchProgress,
}

impl CacheEntry {
    fn check_consistency(&self) -> std::result::Result<(), String> {
        self.pair.check_consistency()?;
        let len = self.pair.old().len();
        let out_of_range = self
            .progress
            .frontier_starts
            .iter()
            .chain(self.progress.differing.iter())
            .find(|id| id.0 >= len);
        match out_of_range {
            Some(id) => Err(format!("progress refers to unknown node {}", id)),
            None => Ok(()),
        }
    }
}

/// Durable store of search state
pub trait CacheStore {
    /// Load the entry for `key`
    ///
    /// Fails with `CacheMiss` when no entry exists and `CorruptCache` when
    /// one exists but cannot be trusted.
    fn load(&self, key: &CacheKey) -> Result<CacheEntry>;

    /// Persist `entry`, replacing any previous entry for its key
    ///
    /// A reader never observes a partially written entry.
    fn store(&self, entry: &CacheEntry) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    format_version: u32,
    checksum: String,
    payload: String,
}

/// File-backed `CacheStore`
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entry for `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(sanitize_component(&key.version))
            .join(sanitize_component(&key.test_case.to_string()))
            .join(format!("{}.json", sanitize_component(&key.version_old)))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &CacheKey) -> Result<CacheEntry> {
        let path = self.path_for(key);
        let corrupt = |reason: String| CauseSearchError::CorruptCache {
            path: path.display().to_string(),
            reason,
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CauseSearchError::CacheMiss {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: CacheEnvelope =
            serde_json::from_str(&content).map_err(|e| corrupt(format!("unreadable envelope: {}", e)))?;

        if envelope.format_version != CACHE_FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} (expected {})",
                envelope.format_version, CACHE_FORMAT_VERSION
            )));
        }

        let checksum = sha256_hex(envelope.payload.as_bytes());
        if checksum != envelope.checksum {
            return Err(corrupt(format!(
                "checksum mismatch (stored {}, computed {})",
                envelope.checksum, checksum
            )));
        }

        let entry: CacheEntry = serde_json::from_str(&envelope.payload)
            .map_err(|e| corrupt(format!("unreadable payload: {}", e)))?;

        if &entry.key != key {
            return Err(corrupt(format!(
                "entry belongs to {} vs {} / {}",
                entry.key.version, entry.key.version_old, entry.key.test_case
            )));
        }
        entry.check_consistency().map_err(corrupt)?;

        tracing::debug!(
            "Loaded cache entry {} ({} frontiers measured)",
            path.display(),
            entry.progress.frontiers_measured
        );
        Ok(entry)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.key);
        let payload = serde_json::to_string(entry)?;
        let envelope = CacheEnvelope {
            format_version: CACHE_FORMAT_VERSION,
            checksum: sha256_hex(payload.as_bytes()),
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        write_atomic(&path, &bytes)?;

        tracing::debug!("Stored cache entry {}", path.display());
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Map a version or test case name onto a single path component
fn sanitize_component(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '#') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    match sanitized.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
