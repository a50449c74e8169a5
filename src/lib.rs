//! jar-patcher: instruction-level patching of compiled modules in an archive
//!
//! Reads a JAR, runs every class file through a chain of transformer plugins,
//! writes the patched archive, and skips all of that when neither the plugins
//! nor the source archive changed since the last build.
//!
//! # Architecture
//!
//! - [`archive`]: zip container as an ordered map of entries plus manifest
//! - [`class`]: class file decode/encode with label-based offsets
//! - [`rewrite`]: window matching and splicing over instruction sequences
//! - [`plugin`]: package discovery, host registry, load-once chain
//! - [`cache`]: content digest over plugins and source
//! - [`pipeline`]: the build that ties them together
//!
//! # Safety
//!
//! - The patched archive and the digest are written atomically (tempfile + fsync + rename)
//! - The digest is recorded only after the archive is written
//! - Plugins load all-or-nothing
//! - A method edit that cannot be placed unambiguously leaves the class untouched
//!
//! # Example
//!
//! ```no_run
//! use jar_patcher::{BuildOutcome, Pipeline, Settings, TransformerRegistry};
//!
//! let settings = Settings::default();
//! let mut pipeline = Pipeline::new(&settings, TransformerRegistry::with_builtins());
//!
//! match pipeline.run() {
//!     Ok(BuildOutcome::Cached { artifact }) => println!("Reused {}", artifact.display()),
//!     Ok(outcome) => println!("Built {}", outcome.artifact().display()),
//!     Err(e) => eprintln!("Build failed: {}", e),
//! }
//! ```

pub mod archive;
mod atomic;
pub mod cache;
pub mod class;
pub mod config;
pub mod pipeline;
pub mod plugin;
pub mod rewrite;

// Re-exports
pub use archive::{Archive, ArchiveError, ArchiveMetadata, SourceArchive};
pub use cache::{CacheError, CacheStatus, CacheValidator, DigestAlgorithm};
pub use class::{ClassError, DecodedMethod, DecodedModule, EncodeError, MethodRule, SelectError};
pub use config::{load_settings, ConfigError, LogLevel, Settings};
pub use pipeline::{BuildOutcome, Pipeline, PipelineError};
pub use plugin::{
    PluginChain, PluginError, TransformError, Transformer, TransformerManifest,
    TransformerRegistry,
};
pub use rewrite::{InsnPredicate, WindowPattern, WindowRewrite};
