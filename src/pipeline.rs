//! One build: cache check, load, transform, write, record.

use crate::archive::{ArchiveError, SourceArchive};
use crate::cache::{current_digest, CacheError, CacheValidator};
use crate::config::Settings;
use crate::plugin::{retain_compatible, PluginChain, PluginError, TransformerRegistry};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The stored digest matched; nothing was loaded or written.
    Cached { artifact: PathBuf },
    Rebuilt {
        artifact: PathBuf,
        /// Entries passed through the chain.
        modules: usize,
        /// Entries whose bytes differ after the chain.
        changed: usize,
        plugins: usize,
    },
}

impl BuildOutcome {
    pub fn artifact(&self) -> &Path {
        match self {
            BuildOutcome::Cached { artifact } | BuildOutcome::Rebuilt { artifact, .. } => artifact,
        }
    }
}

/// `net/minecraft/server/EntitySlime.class` → `net.minecraft.server.EntitySlime`.
/// `None` for entries that are not modules.
pub fn qualified_name(entry: &str, suffix: &str) -> Option<String> {
    if entry.ends_with('/') {
        return None;
    }
    let stem = entry.strip_suffix(suffix)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace('/', "."))
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    registry: TransformerRegistry,
    chain: PluginChain,
    validator: CacheValidator,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, registry: TransformerRegistry) -> Self {
        let validator = CacheValidator::new(
            &settings.paths.cache,
            settings.artifact_path(),
            settings.build.digest,
        );
        Self {
            settings,
            registry,
            chain: PluginChain::new(),
            validator,
        }
    }

    pub fn validator(&self) -> &CacheValidator {
        &self.validator
    }

    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }

    /// Build the patched archive, or reuse it when the inputs are unchanged.
    /// The digest is only written after the archive is.
    pub fn run(&mut self) -> Result<BuildOutcome, PipelineError> {
        let settings = self.settings;
        let paths = &settings.paths;
        let artifact = self.validator.artifact.clone();

        let status = self.validator.check(&paths.plugins, &paths.source)?;
        if status.is_valid() {
            info!("Cache is valid, reusing {}", artifact.display());
            return Ok(BuildOutcome::Cached { artifact });
        }
        info!("Cache is stale, rebuilding {}", artifact.display());

        let mut source = SourceArchive::load(&paths.source, &paths.dump)?;
        let mut candidates = self.chain.discover(&paths.plugins)?;
        retain_compatible(&mut candidates, &source.version);
        let plugins = self.chain.load(candidates, &self.registry)?;

        let suffix = settings.build.module_suffix.as_str();
        let mut modules = 0;
        let mut changed = 0;
        for (path, bytes) in source.archive.iter_mut() {
            let Some(name) = qualified_name(path.as_str(), suffix) else {
                continue;
            };
            let original = std::mem::take(bytes);
            let before = (original.len(), xxh3_64(&original));
            *bytes = self.chain.apply_all(original, &name)?;
            modules += 1;
            if before != (bytes.len(), xxh3_64(bytes)) {
                debug!("{} changed", name);
                changed += 1;
            }
        }
        info!(
            "Transformed {} modules with {} plugins ({} changed)",
            modules, plugins, changed
        );

        source
            .archive
            .write(&artifact, &settings.base_metadata())?;

        let digest = current_digest(&paths.plugins, &paths.source, settings.build.digest)?;
        self.validator.record(&digest)?;
        debug!("Recorded digest {}", digest);

        Ok(BuildOutcome::Rebuilt {
            artifact,
            modules,
            changed,
            plugins,
        })
    }
}
