use crate::config::matches_requirement;
use crate::plugin::errors::PluginError;
use crate::plugin::manifest::TransformerManifest;
use crate::plugin::registry::{Transformer, TransformerRegistry};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Packages found in a plugin directory, keyed (and so ordered) by path.
pub type Candidates = BTreeMap<PathBuf, TransformerManifest>;

const PACKAGE_EXTENSIONS: [&str; 2] = ["jar", "zip"];

/// List plugin packages under `directory` and parse their manifests.
///
/// Creates the directory when missing. A package whose manifest cannot be
/// used is logged and left out; it never fails the whole discovery.
pub fn discover(directory: &Path) -> Result<Candidates, PluginError> {
    if !directory.exists() {
        fs::create_dir_all(directory).map_err(|source| PluginError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        info!("Created plugin directory {}", directory.display());
        return Ok(Candidates::new());
    }
    if !directory.is_dir() {
        return Err(PluginError::NotADirectory {
            path: directory.to_path_buf(),
        });
    }

    let io_err = |source| PluginError::Io {
        path: directory.to_path_buf(),
        source,
    };
    let mut candidates = Candidates::new();
    for entry in fs::read_dir(directory).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_package = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    PACKAGE_EXTENSIONS
                        .iter()
                        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                });
        if !is_package {
            warn!("Ignoring {}: not a .jar or .zip package", path.display());
            continue;
        }
        match TransformerManifest::read_package(&path) {
            Ok(manifest) => {
                debug!(
                    "Found {} {} ({}) in {}",
                    manifest.name,
                    manifest.version,
                    manifest.entry_point,
                    path.display()
                );
                candidates.insert(path, manifest);
            }
            Err(e) => error!("{}", e),
        }
    }
    info!("Found {} plugin packages", candidates.len());
    Ok(candidates)
}

/// Drop packages whose `supported_versions` does not accept `version`.
pub fn retain_compatible(candidates: &mut Candidates, version: &str) {
    candidates.retain(|path, manifest| {
        match matches_requirement(version, manifest.supported_versions.as_deref()) {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    "Skipping {} ({}): supports {}, source version is {}",
                    manifest.name,
                    path.display(),
                    manifest.supported_versions.as_deref().unwrap_or("*"),
                    version
                );
                false
            }
            Err(e) => {
                warn!("Skipping {} ({}): {}", manifest.name, path.display(), e);
                false
            }
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Unloaded,
    Discovering,
    Loaded,
}

pub struct LoadedTransformer {
    pub manifest: TransformerManifest,
    pub path: PathBuf,
    transformer: Box<dyn Transformer>,
}

impl fmt::Debug for LoadedTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedTransformer")
            .field("manifest", &self.manifest)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Ordered transformers, loaded at most once.
#[derive(Debug)]
pub struct PluginChain {
    state: ChainState,
    loaded: Vec<LoadedTransformer>,
}

impl Default for PluginChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginChain {
    pub fn new() -> Self {
        Self {
            state: ChainState::Unloaded,
            loaded: Vec::new(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn loaded(&self) -> &[LoadedTransformer] {
        &self.loaded
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// [`discover`], tracked by the chain's state.
    pub fn discover(&mut self, directory: &Path) -> Result<Candidates, PluginError> {
        if self.state == ChainState::Loaded {
            warn!("Plugins already loaded; discovery result will not be used");
            return discover(directory);
        }
        self.state = ChainState::Discovering;
        discover(directory).inspect_err(|_| self.state = ChainState::Unloaded)
    }

    /// Instantiate every candidate in path order. Any failure aborts the
    /// whole load and leaves the chain unloaded.
    pub fn load(
        &mut self,
        candidates: Candidates,
        registry: &TransformerRegistry,
    ) -> Result<usize, PluginError> {
        if self.state == ChainState::Loaded {
            warn!("Plugins already loaded; ignoring repeated load");
            return Ok(self.loaded.len());
        }
        self.state = ChainState::Discovering;

        let mut loaded = Vec::with_capacity(candidates.len());
        for (path, manifest) in candidates {
            match instantiate(&path, &manifest, registry) {
                Ok(transformer) => {
                    info!(
                        "Loaded {} {} by {}",
                        manifest.name, manifest.version, manifest.author
                    );
                    loaded.push(LoadedTransformer {
                        manifest,
                        path,
                        transformer,
                    });
                }
                Err(e) => {
                    self.state = ChainState::Unloaded;
                    return Err(e);
                }
            }
        }

        self.loaded = loaded;
        self.state = ChainState::Loaded;
        info!("Loaded {} plugins.", self.loaded.len());
        Ok(self.loaded.len())
    }

    /// Run `module` through every loaded transformer in load order.
    pub fn apply_all(&mut self, module: Vec<u8>, qualified_name: &str) -> Result<Vec<u8>, PluginError> {
        if self.state != ChainState::Loaded {
            debug!("Chain not loaded; {} passes through", qualified_name);
            return Ok(module);
        }
        self.loaded.iter_mut().try_fold(module, |bytes, loaded| {
            loaded
                .transformer
                .transform(bytes, qualified_name)
                .map_err(|source| PluginError::Transform {
                    name: loaded.manifest.name.clone(),
                    module: qualified_name.to_string(),
                    source,
                })
        })
    }
}

fn instantiate(
    path: &Path,
    manifest: &TransformerManifest,
    registry: &TransformerRegistry,
) -> Result<Box<dyn Transformer>, PluginError> {
    let load_err = |source| PluginError::Load {
        path: path.to_path_buf(),
        name: manifest.name.clone(),
        source,
    };
    match registry.create(manifest) {
        None => Err(PluginError::Contract {
            path: path.to_path_buf(),
            entry_point: manifest.entry_point.clone(),
            suggestion: registry.suggest(&manifest.entry_point),
        }),
        Some(Err(source)) => Err(load_err(source)),
        Some(Ok(mut transformer)) => {
            transformer.init().map_err(load_err)?;
            Ok(transformer)
        }
    }
}
