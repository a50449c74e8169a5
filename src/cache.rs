//! Content-digest cache for the patched archive.
//!
//! The digest covers every file under the plugin directory and the source
//! archive. A stored digest that matches the current one, next to an existing
//! artifact, means the previous build can be reused as is.

use crate::atomic::atomic_write;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_128;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Xxh3,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Xxh3 => "xxh3",
        }
    }

    /// Length of [`DigestAlgorithm::digest`] output in hex characters.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Xxh3 => 32,
        }
    }

    /// Lower-case hex digest of `data`.
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            DigestAlgorithm::Xxh3 => format!("{:032x}", xxh3_128(data)),
        }
    }

    fn chain(self, previous: &str, next: &str) -> String {
        let mut joined = String::with_capacity(previous.len() + next.len());
        joined.push_str(previous);
        joined.push_str(next);
        self.digest(joined.as_bytes())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "xxh3" => Ok(DigestAlgorithm::Xxh3),
            other => Err(format!(
                "unknown digest algorithm '{}' (expected sha256 or xxh3)",
                other
            )),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CacheError> {
    fs::read(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Chained digest over every file under `dir`, in path order.
/// Symlinks are followed so the digest covers what discovery loads.
/// A missing directory digests to the empty string.
pub fn directory_digest(dir: &Path, algorithm: DigestAlgorithm) -> Result<String, CacheError> {
    let mut digest = String::new();
    if !dir.exists() {
        return Ok(digest);
    }
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| CacheError::Read {
            path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_digest = algorithm.digest(&read_file(entry.path())?);
        digest = algorithm.chain(&digest, &file_digest);
    }
    Ok(digest)
}

/// Digest of the plugin directory combined with the source archive.
pub fn current_digest(
    plugin_dir: &Path,
    source: &Path,
    algorithm: DigestAlgorithm,
) -> Result<String, CacheError> {
    let dir_digest = directory_digest(plugin_dir, algorithm)?;
    let source_digest = algorithm.digest(&read_file(source)?);
    Ok(algorithm.chain(&dir_digest, &source_digest))
}

/// True only when `stored_path` holds exactly `expected_len` characters that
/// equal `current`, ignoring case. Read failures count as a miss.
pub fn is_valid(stored_path: &Path, expected_len: usize, current: &str) -> bool {
    if !stored_path.exists() {
        debug!("No stored digest at {}", stored_path.display());
        return false;
    }
    let stored = match fs::read_to_string(stored_path) {
        Ok(stored) => stored,
        Err(source) => {
            let err = CacheError::Read {
                path: stored_path.to_path_buf(),
                source,
            };
            warn!("{}; treating cache as invalid", err);
            return false;
        }
    };
    if stored.chars().count() != expected_len {
        debug!(
            "Stored digest has {} characters, expected {}",
            stored.chars().count(),
            expected_len
        );
        return false;
    }
    stored.eq_ignore_ascii_case(current)
}

/// Replace the digest file with `digest`.
pub fn store(path: &Path, digest: &str) -> Result<(), CacheError> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e)),
    }
    atomic_write(path, digest.as_bytes()).map_err(write_err)
}

/// Remove both the produced archive and its digest so the next run rebuilds.
pub fn invalidate(artifact: &Path, digest_file: &Path) -> Result<(), CacheError> {
    for path in [artifact, digest_file] {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Write {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Valid { digest: String },
    Stale { digest: String },
}

impl CacheStatus {
    pub fn digest(&self) -> &str {
        match self {
            CacheStatus::Valid { digest } | CacheStatus::Stale { digest } => digest,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CacheStatus::Valid { .. })
    }
}

/// Cache decision for one produced archive.
#[derive(Debug, Clone)]
pub struct CacheValidator {
    pub algorithm: DigestAlgorithm,
    pub digest_file: PathBuf,
    pub artifact: PathBuf,
}

impl CacheValidator {
    /// Digest file is `<cache_dir>/plugins.<algorithm>`.
    pub fn new(cache_dir: &Path, artifact: PathBuf, algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            digest_file: cache_dir.join(format!("plugins.{}", algorithm.name())),
            artifact,
        }
    }

    pub fn check(&self, plugin_dir: &Path, source: &Path) -> Result<CacheStatus, CacheError> {
        let digest = current_digest(plugin_dir, source, self.algorithm)?;
        debug!("Current digest: {}", digest);
        if !self.artifact.exists() {
            debug!("No produced archive at {}", self.artifact.display());
            return Ok(CacheStatus::Stale { digest });
        }
        if is_valid(&self.digest_file, self.algorithm.hex_len(), &digest) {
            Ok(CacheStatus::Valid { digest })
        } else {
            Ok(CacheStatus::Stale { digest })
        }
    }

    pub fn record(&self, digest: &str) -> Result<(), CacheError> {
        store(&self.digest_file, digest)
    }

    pub fn invalidate(&self) -> Result<(), CacheError> {
        invalidate(&self.artifact, &self.digest_file)
    }
}
