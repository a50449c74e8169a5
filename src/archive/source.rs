use crate::archive::errors::ArchiveError;
use crate::archive::store::Archive;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{error, info, warn};

pub const VERSION_PATH: &str = "version.json";

#[derive(Debug, Deserialize)]
struct VersionRecord {
    id: String,
}

/// The unpatched input archive together with its version id.
#[derive(Debug, Clone)]
pub struct SourceArchive {
    pub archive: Archive,
    pub version: String,
}

impl SourceArchive {
    /// Load `path` and read the `id` of its `version.json`. Without that
    /// entry every entry is dumped under `dump_dir` for inspection.
    pub fn load(path: &Path, dump_dir: &Path) -> Result<Self, ArchiveError> {
        let archive = Archive::load(path)?;

        let Some(raw) = archive.get(VERSION_PATH) else {
            error!(
                "{} has no {}; dumping its entries to {}",
                path.display(),
                VERSION_PATH,
                dump_dir.display()
            );
            let written = dump_entries(&archive, dump_dir)?;
            info!("Dumped {} entries", written);
            return Err(ArchiveError::MissingVersion {
                path: path.to_path_buf(),
                dump_dir: dump_dir.to_path_buf(),
            });
        };

        let record: VersionRecord =
            serde_json::from_slice(raw).map_err(|e| ArchiveError::InvalidVersion {
                path: path.to_path_buf(),
                message: e.to_string(),
                raw: String::from_utf8_lossy(raw).into_owned(),
            })?;

        info!("Source archive version: {}", record.id);
        Ok(Self {
            archive,
            version: record.id,
        })
    }
}

/// Write every file entry under `dir`. Entries whose path would escape `dir`
/// are skipped with a warning. Returns the number of files written.
pub fn dump_entries(archive: &Archive, dir: &Path) -> Result<usize, ArchiveError> {
    let mut written = 0;
    for (entry, bytes) in archive.iter() {
        let Some(relative) = safe_relative_path(entry.as_str()) else {
            warn!("Skipping unsafe entry path {}", entry);
            continue;
        };
        let target = dir.join(relative);
        let result = if entry.is_dir() {
            fs::create_dir_all(&target)
        } else {
            target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(&target, bytes))
        };
        result.map_err(|source| ArchiveError::Dump {
            path: target.clone(),
            source,
        })?;
        if !entry.is_dir() {
            written += 1;
        }
    }
    Ok(written)
}

fn safe_relative_path(entry: &str) -> Option<PathBuf> {
    let path = Path::new(entry.trim_end_matches('/'));
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
